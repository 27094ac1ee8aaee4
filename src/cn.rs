//! The variant-parameterised CryptoNight hash core.
//!
//! Every entry point here is monomorphised over the AES back-end and the
//! variant number, so a worker runs a single specialised loop for its whole
//! lifetime with no policy branches on the hot path. The Keccak sponge in
//! front and the permutation plus finalising hash behind are shared.
use blake_hash::Blake256;
use digest::generic_array::typenum::U32;
use digest::generic_array::GenericArray;
use digest::Digest;
use groestl::Groestl256;
use jh_x86_64::Jh256;
use skein_hash::Skein512;
use slice_cast::cast_mut;

use crate::aes::{genkey, AesRound};
use crate::u64p::U64p;
use crate::variant::{
    check_input_len, v1_store_tweak, v1_tweak, v2_int_math, v2_shuffle_add, v2_shuffle_add_fold,
};
use crate::{A16, CnContext, ROUNDS};

/// Absorb an arbitrary input and dump the full 200 byte permutation state.
pub(crate) fn keccak1600(input: &[u8], state: &mut A16<[u8; 200]>) {
    let mut hasher = sha3::Keccak256Full::default();
    digest::Input::input(&mut hasher, input);
    state
        .0
        .copy_from_slice(digest::FixedOutput::fixed_result(hasher).as_slice());
}

/// Run keccak-f[1600] over the state in place.
pub(crate) fn keccakf(state: &mut A16<[u8; 200]>) {
    #[allow(clippy::cast_ptr_alignment)]
    tiny_keccak::keccakf(unsafe { &mut *(state as *mut A16<[u8; 200]> as *mut [u64; 25]) });
}

#[allow(clippy::cast_ptr_alignment)]
fn state_words(state: &A16<[u8; 200]>) -> &[u64; 25] {
    unsafe { &*(state as *const A16<[u8; 200]> as *const [u64; 25]) }
}

/// Select and run the finalising hash on the permuted state.
pub(crate) fn extra_hash(state: &[u8; 200]) -> GenericArray<u8, U32> {
    match state[0] & 3 {
        0 => Blake256::digest(state),
        1 => Groestl256::digest(state),
        2 => Jh256::digest(state),
        3 => Skein512::digest(state),
        x => unreachable!("Invalid output option {}", x),
    }
}

/// Fill the scratch pad from the Keccak state in 128 byte strides.
pub(crate) fn explode_scratchpad<A: AesRound>(state: &[u8; 200], scratchpad: &mut [U64p]) {
    let keys = genkey(&state[..32]);

    let mut blocks = [U64p::default(); 8];
    for (block, chunk) in blocks.iter_mut().zip(state[64..192].chunks_exact(16)) {
        *block = U64p::from(chunk);
    }

    for stride in scratchpad.chunks_exact_mut(8) {
        for block in blocks.iter_mut() {
            for key in keys.iter() {
                *block = A::round(*block, *key);
            }
        }
        stride.copy_from_slice(&blocks);
    }
}

/// The inverse mixing: fold the whole scratch pad back into state bytes
/// 64..192.
pub(crate) fn implode_scratchpad<A: AesRound>(state: &mut [u8; 200], scratchpad: &[U64p]) {
    let keys = genkey(&state[32..64]);

    let mut blocks = [U64p::default(); 8];
    for (block, chunk) in blocks.iter_mut().zip(state[64..192].chunks_exact(16)) {
        *block = U64p::from(chunk);
    }

    for stride in scratchpad.chunks_exact(8) {
        for (block, word) in blocks.iter_mut().zip(stride.iter()) {
            *block = *block ^ *word;
            for key in keys.iter() {
                *block = A::round(*block, *key);
            }
        }
    }

    for (chunk, block) in state[64..192].chunks_exact_mut(16).zip(blocks.iter()) {
        chunk.copy_from_slice(block.as_ref());
    }
}

/// Explode, run the main loop and implode, leaving the state ready for the
/// final permutation.
pub(crate) fn run<A: AesRound, const VARIANT: u8>(
    state: &mut A16<[u8; 200]>,
    scratchpad: &mut [U64p],
    tweak1_2: u64,
) {
    explode_scratchpad::<A>(&state.0, scratchpad);

    let words = *state_words(state);
    main_loop::<A, VARIANT>(scratchpad, &words, tweak1_2);

    implode_scratchpad::<A>(&mut state.0, scratchpad);
}

fn main_loop<A: AesRound, const VARIANT: u8>(
    sp: &mut [U64p],
    words: &[u64; 25],
    tweak1_2: u64,
) {
    let mut a = U64p(words[0] ^ words[4], words[1] ^ words[5]);
    let mut b = U64p(words[2] ^ words[6], words[3] ^ words[7]);
    let mut b1 = U64p(words[8] ^ words[10], words[9] ^ words[11]);
    let mut division_result = words[12];
    let mut sqrt_result = words[13];

    let mut idx = a.addr();

    for _ in 0..ROUNDS {
        let c = A::round(sp[idx >> 4], a);

        if VARIANT == 2 {
            v2_shuffle_add(sp, idx, a, b, b1);
        }

        sp[idx >> 4] = if VARIANT == 1 {
            v1_store_tweak(b ^ c)
        } else {
            b ^ c
        };

        idx = c.addr();
        let mut cl = sp[idx >> 4].0;
        let ch = sp[idx >> 4].1;

        if VARIANT == 2 {
            // Division and square root results of the previous iteration
            // hide the latency of the current one.
            cl ^= division_result ^ (sqrt_result << 32);
            v2_int_math(c, &mut division_result, &mut sqrt_result);
        }

        let U64p(mut hi, mut lo) = c * U64p(cl, ch);

        if VARIANT == 2 {
            v2_shuffle_add_fold(sp, idx, a, b, b1, &mut hi, &mut lo);
        }

        a = a + U64p(hi, lo);
        sp[idx >> 4] = if VARIANT == 1 {
            U64p(a.0, a.1 ^ tweak1_2)
        } else {
            a
        };

        a = a ^ U64p(cl, ch);
        idx = a.addr();

        if VARIANT == 2 {
            b1 = b;
        }
        b = c;
    }
}

/// Single-stream hash: sponge, scratch pad walk, permutation, finalisation.
#[inline(always)]
pub(crate) fn hash_impl<A: AesRound, const VARIANT: u8>(
    input: &[u8],
    output: &mut [u8; 32],
    ctx: &mut CnContext,
) {
    check_input_len(VARIANT, input);

    let CnContext {
        hash_state,
        scratchpad,
    } = ctx;

    keccak1600(input, hash_state);
    let tweak1_2 = if VARIANT == 1 {
        v1_tweak(input, &hash_state.0)
    } else {
        0
    };

    let sp: &mut [U64p] = unsafe { cast_mut(scratchpad.as_mut_slice()) };
    run::<A, VARIANT>(hash_state, sp, tweak1_2);

    keccakf(hash_state);
    output.copy_from_slice(extra_hash(&hash_state.0).as_slice());
}

/// Two independent streams interleaved through one loop. On cores with
/// enough cache this hides most of the memory latency of a single stream.
#[inline(always)]
pub(crate) fn double_hash_impl<A: AesRound, const VARIANT: u8>(
    input0: &[u8],
    input1: &[u8],
    output: &mut [u8; 64],
    ctx0: &mut CnContext,
    ctx1: &mut CnContext,
) {
    check_input_len(VARIANT, input0);
    check_input_len(VARIANT, input1);

    let CnContext {
        hash_state: h0,
        scratchpad: s0,
    } = ctx0;
    let CnContext {
        hash_state: h1,
        scratchpad: s1,
    } = ctx1;

    keccak1600(input0, h0);
    keccak1600(input1, h1);

    let tweaks = if VARIANT == 1 {
        (v1_tweak(input0, &h0.0), v1_tweak(input1, &h1.0))
    } else {
        (0, 0)
    };

    let sp0: &mut [U64p] = unsafe { cast_mut(s0.as_mut_slice()) };
    let sp1: &mut [U64p] = unsafe { cast_mut(s1.as_mut_slice()) };

    explode_scratchpad::<A>(&h0.0, sp0);
    explode_scratchpad::<A>(&h1.0, sp1);

    let words0 = *state_words(h0);
    let words1 = *state_words(h1);
    double_main_loop::<A, VARIANT>(sp0, &words0, tweaks.0, sp1, &words1, tweaks.1);

    implode_scratchpad::<A>(&mut h0.0, sp0);
    implode_scratchpad::<A>(&mut h1.0, sp1);

    keccakf(h0);
    output[..32].copy_from_slice(extra_hash(&h0.0).as_slice());
    keccakf(h1);
    output[32..].copy_from_slice(extra_hash(&h1.0).as_slice());
}

#[allow(clippy::too_many_arguments)]
fn double_main_loop<A: AesRound, const VARIANT: u8>(
    sp0: &mut [U64p],
    words0: &[u64; 25],
    tweak0: u64,
    sp1: &mut [U64p],
    words1: &[u64; 25],
    tweak1: u64,
) {
    let mut a0 = U64p(words0[0] ^ words0[4], words0[1] ^ words0[5]);
    let mut b00 = U64p(words0[2] ^ words0[6], words0[3] ^ words0[7]);
    let mut b01 = U64p(words0[8] ^ words0[10], words0[9] ^ words0[11]);
    let mut a1 = U64p(words1[0] ^ words1[4], words1[1] ^ words1[5]);
    let mut b10 = U64p(words1[2] ^ words1[6], words1[3] ^ words1[7]);
    let mut b11 = U64p(words1[8] ^ words1[10], words1[9] ^ words1[11]);

    let mut division0 = words0[12];
    let mut sqrt0 = words0[13];
    let mut division1 = words1[12];
    let mut sqrt1 = words1[13];

    let mut idx0 = a0.addr();
    let mut idx1 = a1.addr();

    for _ in 0..ROUNDS {
        let c0 = A::round(sp0[idx0 >> 4], a0);
        if VARIANT == 2 {
            v2_shuffle_add(sp0, idx0, a0, b00, b01);
        }
        sp0[idx0 >> 4] = if VARIANT == 1 {
            v1_store_tweak(b00 ^ c0)
        } else {
            b00 ^ c0
        };
        idx0 = c0.addr();

        let c1 = A::round(sp1[idx1 >> 4], a1);
        if VARIANT == 2 {
            v2_shuffle_add(sp1, idx1, a1, b10, b11);
        }
        sp1[idx1 >> 4] = if VARIANT == 1 {
            v1_store_tweak(b10 ^ c1)
        } else {
            b10 ^ c1
        };
        idx1 = c1.addr();

        let mut cl = sp0[idx0 >> 4].0;
        let ch = sp0[idx0 >> 4].1;
        if VARIANT == 2 {
            cl ^= division0 ^ (sqrt0 << 32);
        }
        let U64p(mut hi, mut lo) = c0 * U64p(cl, ch);
        if VARIANT == 2 {
            v2_shuffle_add_fold(sp0, idx0, a0, b00, b01, &mut hi, &mut lo);
        }
        a0 = a0 + U64p(hi, lo);
        sp0[idx0 >> 4] = if VARIANT == 1 {
            U64p(a0.0, a0.1 ^ tweak0)
        } else {
            a0
        };
        a0 = a0 ^ U64p(cl, ch);
        idx0 = a0.addr();

        let mut cl = sp1[idx1 >> 4].0;
        let ch = sp1[idx1 >> 4].1;
        if VARIANT == 2 {
            cl ^= division1 ^ (sqrt1 << 32);
            // Both chains advance once per iteration, fed by this
            // iteration's AES outputs.
            v2_int_math(c0, &mut division0, &mut sqrt0);
            v2_int_math(c1, &mut division1, &mut sqrt1);
        }
        let U64p(mut hi, mut lo) = c1 * U64p(cl, ch);
        if VARIANT == 2 {
            v2_shuffle_add_fold(sp1, idx1, a1, b10, b11, &mut hi, &mut lo);
        }
        a1 = a1 + U64p(hi, lo);
        sp1[idx1 >> 4] = if VARIANT == 1 {
            U64p(a1.0, a1.1 ^ tweak1)
        } else {
            a1
        };
        a1 = a1 ^ U64p(cl, ch);
        idx1 = a1.addr();

        if VARIANT == 2 {
            b01 = b00;
            b11 = b10;
        }
        b00 = c0;
        b10 = c1;
    }
}
