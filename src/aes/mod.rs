//! Portable AES primitives shared by both CryptoNight back-ends.
//!
//! CryptoNight only ever needs a single AES round (no whitening, no final
//! round special case) plus the ten round keys derived from a 32 byte slice
//! of the Keccak state. The round itself is implemented with the classic
//! four T-table formulation; the key schedule is the plain byte-oriented
//! AES-256 expansion truncated to ten keys, which is exactly equivalent to
//! the `AESKEYGENASSIST`-based derivation used by hardware miners.
use constants::*;

use crate::u64p::U64p;

mod constants;

/// One AES round implementation, selected per worker at startup.
pub(crate) trait AesRound {
    fn round(block: U64p, key: U64p) -> U64p;
}

/// Table-based software AES, used when AES-NI is unavailable or disabled.
pub(crate) struct SoftAes;

impl AesRound for SoftAes {
    #[inline]
    fn round(block: U64p, key: U64p) -> U64p {
        aes_round(block, key)
    }
}

/// One software AES round: SubBytes, ShiftRows and MixColumns folded into 16
/// table lookups, followed by the round-key XOR.
#[inline]
pub(crate) fn aes_round(block: U64p, key: U64p) -> U64p {
    let x0 = block.0 as u32;
    let x1 = (block.0 >> 32) as u32;
    let x2 = block.1 as u32;
    let x3 = (block.1 >> 32) as u32;

    let y0 = T_FN[0][(x0 & 0xFF) as usize]
        ^ T_FN[1][((x1 >> 8) & 0xFF) as usize]
        ^ T_FN[2][((x2 >> 16) & 0xFF) as usize]
        ^ T_FN[3][(x3 >> 24) as usize];
    let y1 = T_FN[0][(x1 & 0xFF) as usize]
        ^ T_FN[1][((x2 >> 8) & 0xFF) as usize]
        ^ T_FN[2][((x3 >> 16) & 0xFF) as usize]
        ^ T_FN[3][(x0 >> 24) as usize];
    let y2 = T_FN[0][(x2 & 0xFF) as usize]
        ^ T_FN[1][((x3 >> 8) & 0xFF) as usize]
        ^ T_FN[2][((x0 >> 16) & 0xFF) as usize]
        ^ T_FN[3][(x1 >> 24) as usize];
    let y3 = T_FN[0][(x3 & 0xFF) as usize]
        ^ T_FN[1][((x0 >> 8) & 0xFF) as usize]
        ^ T_FN[2][((x1 >> 16) & 0xFF) as usize]
        ^ T_FN[3][(x2 >> 24) as usize];

    U64p(
        u64::from(y0) | (u64::from(y1) << 32),
        u64::from(y2) | (u64::from(y3) << 32),
    ) ^ key
}

/// SubBytes step
fn sub_bytes(block: &mut [u8]) {
    for c in block.iter_mut() {
        *c = s_box(*c)
    }
}

pub fn xor(block: &mut [u8], round_key: &[u8]) {
    for (c, k) in block.iter_mut().zip(round_key.iter()) {
        *c ^= *k;
    }
}

fn schedule_core(new_key: &mut [u8], rcon: u8) {
    new_key.rotate_left(1);
    sub_bytes(new_key);
    new_key[0] ^= rcon;
}

/// Expand 32 bytes of Keccak state into the ten 16 byte round keys.
pub fn derive_key(main: &[u8]) -> [u8; 160] {
    let mut key_buffer = [0u8; 160];
    key_buffer[..32].copy_from_slice(main);

    let mut rcon = 1;

    for offset in (32..key_buffer.len()).step_by(4) {
        let (finished, in_progress) = key_buffer.split_at_mut(offset);
        let previous = &finished[offset - 4..];
        let next = &mut in_progress[..4];
        next.copy_from_slice(previous);

        if offset % 32 == 0 {
            schedule_core(next, rcon);
            rcon = gmul2(rcon);
        } else if offset % 32 == 16 {
            sub_bytes(next);
        }

        xor(next, &finished[(offset - 32)..]);
    }

    key_buffer
}

/// The round keys of `derive_key`, viewed as ten 128 bit registers.
pub(crate) fn genkey(main: &[u8]) -> [U64p; 10] {
    let buffer = derive_key(main);
    let mut keys = [U64p::default(); 10];
    for (key, chunk) in keys.iter_mut().zip(buffer.chunks_exact(16)) {
        *key = U64p::from(chunk);
    }
    keys
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_multiplicative_inverse() {
        assert_eq!(1, multiplicative_inverse(1));
        assert_eq!(0, multiplicative_inverse(0));
        assert_eq!(0x53, multiplicative_inverse(0xCA));
        assert_eq!(0xCA, multiplicative_inverse(0x53));
    }

    #[test]
    fn test_s_box() {
        // Sample values taken from https://en.wikipedia.org/wiki/Rijndael_S-box#Forward_S-box
        assert_eq!(0x63, s_box(0x00));
        assert_eq!(0x7c, s_box(0x01));
        assert_eq!(0x70, s_box(0xd0));
        assert_eq!(0x38, s_box(0x76));
    }

    #[test]
    fn test_derive_key() {
        let primary = hex!("00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f 10 11 12 13 14 15 16 17 18 19 1a 1b 1c 1d 1e 1f");
        let expected = hex!("00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f
                             10 11 12 13 14 15 16 17 18 19 1a 1b 1c 1d 1e 1f
                             a5 73 c2 9f a1 76 c4 98 a9 7f ce 93 a5 72 c0 9c
                             16 51 a8 cd 02 44 be da 1a 5d a4 c1 06 40 ba de
                             ae 87 df f0 0f f1 1b 68 a6 8e d5 fb 03 fc 15 67
                             6d e1 f1 48 6f a5 4f 92 75 f8 eb 53 73 b8 51 8d
                             c6 56 82 7f c9 a7 99 17 6f 29 4c ec 6c d5 59 8b
                             3d e2 3a 75 52 47 75 e7 27 bf 9e b4 54 07 cf 39
                             0b dc 90 5f c2 7b 09 48 ad 52 45 a4 c1 87 1c 2f
                             45 f5 a6 60 17 b2 d3 87 30 0d 4d 33 64 0a 82 0a");
        let result = derive_key(&primary);
        assert_eq!(result.as_ref(), expected.as_ref());
    }

    /// Reference ShiftRows, kept only to validate the T-tables.
    fn shift_rows(block: &mut [u8]) {
        // Row 0 doesn't move
        // Swap row 1
        let tmp = block[1];
        for col in 0..3 {
            let index = 1 + 4 * col;
            block[index] = block[index + 4];
        }
        block[13] = tmp;

        // Swap row 2
        block.swap(2, 10);
        block.swap(6, 14);

        // Swap row 3
        let tmp = block[15];
        for col in (1..4).rev() {
            block[col * 4 + 3] = block[col * 4 - 1];
        }
        block[3] = tmp;
    }

    /// Reference MixColumns, kept only to validate the T-tables.
    fn mix_columns(block: &mut [u8]) {
        for slice in block.chunks_exact_mut(4) {
            let mut a = [0u8; 4];
            let mut b = [0u8; 4];

            a.copy_from_slice(slice);

            for (c, db) in slice.iter().zip(b.iter_mut()) {
                *db = gmul2(*c);
            }

            for (i, dest) in slice.iter_mut().enumerate() {
                *dest = b[i] ^ a[(i + 3) % 4] ^ a[(i + 2) % 4] ^ a[(i + 1) % 4] ^ b[(i + 1) % 4];
            }
        }
    }

    fn naive_round(block: &mut [u8; 16], key: &[u8; 16]) {
        sub_bytes(block);
        shift_rows(block);
        mix_columns(block);
        xor(block, key);
    }

    #[test]
    fn test_t_tables_match_naive_round() {
        let samples: [[u8; 16]; 3] = [
            [0; 16],
            *b"0123456789abcdef",
            hex!("db 13 53 45 f2 0a 22 5c 01 01 01 01 c6 c6 c6 c6"),
        ];
        let key: [u8; 16] = hex!("2b 7e 15 16 28 ae d2 a6 ab f7 15 88 09 cf 4f 3c");

        for sample in samples.iter() {
            let mut expected = *sample;
            naive_round(&mut expected, &key);

            let actual = aes_round(U64p::from(&sample[..]), U64p::from(&key[..]));
            assert_eq!(<[u8; 16]>::from(actual), expected);
        }
    }
}
