//! Hash entry points backed by AES and SSE primitives.
//!
//! This module instantiates the same generic core as the software path, but
//! with the round implemented as a single `aesenc`. The instantiations are
//! wrapped in `target_feature` functions so the intrinsics inline into the
//! hot loop; the safe entries may only be handed out after runtime feature
//! detection, which `available` performs.
#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use std::mem::transmute;

use crate::aes::AesRound;
use crate::cn;
use crate::u64p::U64p;
use crate::variant::Variant;
use crate::{A16, CnContext, CnDoubleHashFn, CnHashFn};

/// True when the running CPU supports the AES-NI back-end.
pub(crate) fn available() -> bool {
    is_x86_feature_detected!("aes") && is_x86_feature_detected!("sse4.1")
}

pub(crate) struct HwAes;

impl AesRound for HwAes {
    #[inline(always)]
    fn round(block: U64p, key: U64p) -> U64p {
        unsafe {
            let r = _mm_aesenc_si128(transmute(block), transmute(key));
            transmute(r)
        }
    }
}

/// Variant 0 core for the `Digest` front-end; the caller has already run the
/// sponge.
///
/// # Safety
///
/// Requires AES-NI, see `available`.
#[target_feature(enable = "aes", enable = "sse4.1")]
pub(crate) unsafe fn run_v0(state: &mut A16<[u8; 200]>, scratchpad: &mut [U64p]) {
    cn::run::<HwAes, 0>(state, scratchpad, 0);
}

macro_rules! hw_entries {
    ($hash:ident, $hash_entry:ident, $double:ident, $double_entry:ident, $variant:expr) => {
        #[target_feature(enable = "aes", enable = "sse4.1")]
        unsafe fn $hash(input: &[u8], output: &mut [u8; 32], ctx: &mut CnContext) {
            cn::hash_impl::<HwAes, { $variant }>(input, output, ctx);
        }

        fn $hash_entry(input: &[u8], output: &mut [u8; 32], ctx: &mut CnContext) {
            assert!(available(), "AES-NI hash selected without CPU support");
            unsafe { $hash(input, output, ctx) }
        }

        #[target_feature(enable = "aes", enable = "sse4.1")]
        unsafe fn $double(
            input0: &[u8],
            input1: &[u8],
            output: &mut [u8; 64],
            ctx0: &mut CnContext,
            ctx1: &mut CnContext,
        ) {
            cn::double_hash_impl::<HwAes, { $variant }>(input0, input1, output, ctx0, ctx1);
        }

        fn $double_entry(
            input0: &[u8],
            input1: &[u8],
            output: &mut [u8; 64],
            ctx0: &mut CnContext,
            ctx1: &mut CnContext,
        ) {
            assert!(available(), "AES-NI hash selected without CPU support");
            unsafe { $double(input0, input1, output, ctx0, ctx1) }
        }
    };
}

hw_entries!(hash_v0, hash_v0_entry, double_v0, double_v0_entry, 0);
hw_entries!(hash_v1, hash_v1_entry, double_v1, double_v1_entry, 1);
hw_entries!(hash_v2, hash_v2_entry, double_v2, double_v2_entry, 2);

/// The hardware single-hash function for a variant. Every entry asserts CPU
/// support itself, so a call site that skipped `available()` panics instead
/// of executing unsupported instructions.
pub(crate) fn hash_fn(variant: Variant) -> CnHashFn {
    match variant {
        Variant::V0 => hash_v0_entry,
        Variant::V1 => hash_v1_entry,
        Variant::V2 => hash_v2_entry,
    }
}

/// The hardware double-hash function for a variant; see [`hash_fn`].
pub(crate) fn double_hash_fn(variant: Variant) -> CnDoubleHashFn {
    match variant {
        Variant::V0 => double_v0_entry,
        Variant::V1 => double_v1_entry,
        Variant::V2 => double_v2_entry,
    }
}
