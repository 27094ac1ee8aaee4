//! File-driven hash verification, run once before mining starts.
//!
//! `tests.txt` holds alternating records: one hex-encoded input line
//! followed by the three expected digests for variants 0, 1 and 2. Every
//! input is hashed with all three variants; adjacent inputs additionally go
//! through the double-hash entry point, and when the hardware back-end is
//! present its output is cross-checked against the portable one. Any
//! mismatch refuses startup.
use std::fs;
use std::path::Path;

use log::{error, info};

use crate::scratchpad::MemoryPolicy;
use crate::variant::Variant;
use crate::{
    has_hardware_aes, select_double_hash_fn, select_hash_fn, CnContext, MinerError,
};

const VARIANTS: [Variant; 3] = [Variant::V0, Variant::V1, Variant::V2];

/// Run the self-test records in the given file.
pub fn run<P: AsRef<Path>>(path: P) -> Result<(), MinerError> {
    let text = fs::read_to_string(path)?;
    let result = run_records(&text);
    match &result {
        Ok(()) => info!("Cryptonight hash self-test passed."),
        Err(e) => error!("Cryptonight hash self-test failed: {}", e),
    }
    result
}

fn run_records(text: &str) -> Result<(), MinerError> {
    let mut ctx0 = CnContext::new(MemoryPolicy::NeverUse)?;
    let mut ctx1 = CnContext::new(MemoryPolicy::NeverUse)?;

    let hardware = has_hardware_aes();

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut prev_input: Option<Vec<u8>> = None;
    let mut prev_digests = [[0u8; 32]; 3];

    while let Some(input_line) = lines.next() {
        let input = hex::decode(input_line)
            .map_err(|e| MinerError::SelfTest(format!("bad input line {:?}: {}", input_line, e)))?;

        let mut digests = [[0u8; 32]; 3];

        for (i, &variant) in VARIANTS.iter().enumerate() {
            let expected_line = lines
                .next()
                .ok_or_else(|| MinerError::SelfTest("truncated record".to_string()))?;
            let expected = decode_digest(expected_line)?;

            if input.len() < variant.min_input_len() {
                return Err(MinerError::SelfTest(format!(
                    "input of {} bytes is too short for variant {}",
                    input.len(),
                    variant
                )));
            }

            // The portable implementation is the reference.
            let mut actual = [0u8; 32];
            select_hash_fn(false, variant)(&input, &mut actual, &mut ctx0);
            if actual != expected {
                return Err(mismatch("hash", variant, &input, &actual));
            }

            if hardware {
                let mut hw = [0u8; 32];
                select_hash_fn(true, variant)(&input, &mut hw, &mut ctx0);
                if hw != actual {
                    return Err(mismatch("AES-NI hash", variant, &input, &hw));
                }
            }

            if let Some(prev) = &prev_input {
                let mut expected_dbl = [0u8; 64];
                expected_dbl[..32].copy_from_slice(&prev_digests[i]);
                expected_dbl[32..].copy_from_slice(&expected);

                let mut dbl = [0u8; 64];
                select_double_hash_fn(false, variant)(prev, &input, &mut dbl, &mut ctx0, &mut ctx1);
                if dbl[..] != expected_dbl[..] {
                    return Err(mismatch("double hash", variant, &input, &dbl[..32]));
                }

                if hardware {
                    let mut hw_dbl = [0u8; 64];
                    select_double_hash_fn(true, variant)(
                        prev, &input, &mut hw_dbl, &mut ctx0, &mut ctx1,
                    );
                    if hw_dbl[..] != expected_dbl[..] {
                        return Err(mismatch("AES-NI double hash", variant, &input, &hw_dbl[..32]));
                    }
                }
            }

            digests[i] = expected;
        }

        prev_input = Some(input);
        prev_digests = digests;
    }

    Ok(())
}

fn decode_digest(line: &str) -> Result<[u8; 32], MinerError> {
    let bytes = hex::decode(line)
        .map_err(|e| MinerError::SelfTest(format!("bad digest line {:?}: {}", line, e)))?;
    if bytes.len() != 32 {
        return Err(MinerError::SelfTest(format!(
            "digest line of {} bytes, expected 32",
            bytes.len()
        )));
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Ok(digest)
}

fn mismatch(kind: &str, variant: Variant, input: &[u8], actual: &[u8]) -> MinerError {
    MinerError::SelfTest(format!(
        "{} mismatch (variant {}) for input {}: got {}",
        kind,
        variant,
        hex::encode(input),
        hex::encode(actual),
    ))
}
