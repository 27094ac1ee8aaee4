//! An implementation of the [CryptoNight][1] proof-of-work family together
//! with the worker-thread machinery of a CPU miner.
//!
//! The hash core covers variants 0, 1 and 2 in single- and double-stream
//! form, with a hardware (AES-NI) and a portable table-based back-end that
//! produce bit-identical digests. On top of it sit scratch pad allocation
//! with huge page support, mining workers, a job-switching thread pool and
//! rolling hashrate telemetry.
//!
//! # Hashing
//!
//! ```
//! # use hex_literal::hex;
//! use cryptonight_miner::{CryptoNight, Digest};
//!
//! // Create the CryptoNight hasher
//! let mut hasher = CryptoNight::new();
//!
//! // Input some data into the hasher
//! hasher.input(b"This is ");
//!
//! // Insert more data as needed.
//! hasher.input("a test");
//!
//! // Finalize the result. This will temporary allocate a 2MB buffer.
//! let result = hasher.result();
//!
//! assert_eq!(result[..], hex!("a084f01d1437a09c6985401b60d43554ae105802c5f5d8a9b3253649c0be6605")[..]);
//! ```
//!
//! The `Digest` front-end only covers variant 0; the later variants read
//! back into the raw input and are reached through [`cn_hash`] or the
//! function pointers that [`select_hash_fn`] hands to workers.
//!
//! # Mining
//!
//! ```no_run
//! use std::sync::Arc;
//! use cryptonight_miner::{Job, MinerPool, Share, WorkerConfig};
//!
//! let configs = vec![WorkerConfig::default(); num_cpus::get_physical()];
//! let sink = Arc::new(|share: Share| println!("share for job {}", share.job_id));
//!
//! let pool = MinerPool::start(Job::stalled(), &configs, sink).unwrap();
//! // ... hand jobs from the pool connection to pool.switch_work(...) ...
//! pool.mark_quit();
//! ```
//!
//! Be sure to refer to the [RustCrypto/hashes][2] readme for more
//! information about the Digest traits.
//!
//! [1]: https://cryptonote.org/cns/cns008.txt
//! [2]: https://github.com/RustCrypto/hashes
pub use digest::{BlockInput, Digest, FixedOutput, Input, Reset};
use digest::generic_array::typenum::U32;
use digest::generic_array::GenericArray;
use slice_cast::cast_mut;

use crate::aes::SoftAes;
use crate::u64p::U64p;

mod aes;
#[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), feature = "aesni"))]
mod aesni;
mod cn;
mod job;
mod pool;
mod scratchpad;
pub mod self_test;
mod telemetry;
mod u64p;
mod variant;
mod worker;

pub use crate::job::{Job, Share, ShareSink, MAX_JOB_ID_LEN, MIN_BLOB_LEN, NONCE_OFFSET};
pub use crate::pool::MinerPool;
pub use crate::scratchpad::{MemoryPolicy, Scratchpad, SCRATCHPAD_ALIGNMENT, SCRATCHPAD_SIZE};
pub use crate::telemetry::Telemetry;
pub use crate::variant::{Variant, TWEAK_INPUT_LEN};
pub use crate::worker::{WorkMode, WorkerConfig};

const ROUNDS: usize = 524_288;

/// The scratch pad address mask, derived from its size.
pub(crate) const ADDR_MASK: u64 = (SCRATCHPAD_SIZE - 16) as u64;

#[repr(align(16))]
/// Helper to enforce 16 byte alignment
pub(crate) struct A16<T>(pub T);

/// Errors surfaced at the miner boundary; the hash core itself is total.
#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("scratchpad allocation failed: {0}")]
    Scratchpad(String),
    #[error("job rejected: {0}")]
    InvalidJob(String),
    #[error("hash self-test failed: {0}")]
    SelfTest(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single-stream hash function specialised for one variant and AES
/// back-end. Digests `input` into `output` using the caller's context.
pub type CnHashFn = fn(input: &[u8], output: &mut [u8; 32], ctx: &mut CnContext);

/// The double-stream counterpart of [`CnHashFn`]: two independent inputs,
/// 64 bytes of output, one context per stream.
pub type CnDoubleHashFn = fn(
    input0: &[u8],
    input1: &[u8],
    output: &mut [u8; 64],
    ctx0: &mut CnContext,
    ctx1: &mut CnContext,
);

/// The per-stream working state: the 200 byte Keccak state plus an
/// exclusively owned scratch pad.
pub struct CnContext {
    pub(crate) hash_state: A16<[u8; 200]>,
    pub(crate) scratchpad: Scratchpad,
}

impl CnContext {
    pub fn new(policy: MemoryPolicy) -> Result<CnContext, MinerError> {
        Ok(CnContext {
            hash_state: A16([0; 200]),
            scratchpad: Scratchpad::allocate(policy)?,
        })
    }

    /// Whether the scratch pad ended up on huge pages.
    pub fn uses_huge_pages(&self) -> bool {
        self.scratchpad.uses_huge_pages()
    }
}

/// True when the hardware AES back-end can run on this CPU.
pub fn has_hardware_aes() -> bool {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), feature = "aesni"))]
    {
        if aesni::available() {
            return true;
        }
    }
    false
}

/// Select the single-hash function for a worker. `hw_aes` is a request, not
/// a promise: without CPU support the portable implementation is returned.
pub fn select_hash_fn(hw_aes: bool, variant: Variant) -> CnHashFn {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), feature = "aesni"))]
    {
        if hw_aes && aesni::available() {
            return aesni::hash_fn(variant);
        }
    }
    let _ = hw_aes;
    match variant {
        Variant::V0 => |input, output, ctx| cn::hash_impl::<SoftAes, 0>(input, output, ctx),
        Variant::V1 => |input, output, ctx| cn::hash_impl::<SoftAes, 1>(input, output, ctx),
        Variant::V2 => |input, output, ctx| cn::hash_impl::<SoftAes, 2>(input, output, ctx),
    }
}

/// Select the double-hash function for a worker; see [`select_hash_fn`].
pub fn select_double_hash_fn(hw_aes: bool, variant: Variant) -> CnDoubleHashFn {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), feature = "aesni"))]
    {
        if hw_aes && aesni::available() {
            return aesni::double_hash_fn(variant);
        }
    }
    let _ = hw_aes;
    match variant {
        Variant::V0 => |i0, i1, out, c0, c1| cn::double_hash_impl::<SoftAes, 0>(i0, i1, out, c0, c1),
        Variant::V1 => |i0, i1, out, c0, c1| cn::double_hash_impl::<SoftAes, 1>(i0, i1, out, c0, c1),
        Variant::V2 => |i0, i1, out, c0, c1| cn::double_hash_impl::<SoftAes, 2>(i0, i1, out, c0, c1),
    }
}

/// One-shot variant hash with the best available back-end.
///
/// Variants 1 and 2 require `input.len() >= 43`.
pub fn cn_hash(input: &[u8], variant: Variant, ctx: &mut CnContext) -> [u8; 32] {
    let mut output = [0u8; 32];
    select_hash_fn(true, variant)(input, &mut output, ctx);
    output
}

/// One-shot double hash: `output[..32]` is the digest of `input0`,
/// `output[32..]` the digest of `input1`.
pub fn cn_double_hash(
    input0: &[u8],
    input1: &[u8],
    variant: Variant,
    ctx0: &mut CnContext,
    ctx1: &mut CnContext,
) -> [u8; 64] {
    let mut output = [0u8; 64];
    select_double_hash_fn(true, variant)(input0, input1, &mut output, ctx0, ctx1);
    output
}

/// CryptoNight version 0 implementation behind the `Digest` traits.
#[derive(Debug, Default, Clone)]
pub struct CryptoNight {
    internal_hasher: sha3::Keccak256Full,
}

impl CryptoNight {
    /// Alignment requirement for the scratch pad.
    pub const SP_ALIGNMENT: usize = SCRATCHPAD_ALIGNMENT;
    /// Scratch pad size.
    pub const SP_SIZE: usize = SCRATCHPAD_SIZE;

    /// Compute a digest with a provided buffer.
    ///
    /// This method performs no allocations, as opposed to the
    /// `fixed_result` method. However, the scratchpad should be of
    /// proper length and alignment. See the `SP_ALIGNMENT` and `SP_SIZE`
    /// constants for the exact requirements.
    ///
    /// See also: `Digest::fixed_result()`.
    ///
    /// # Panics
    ///
    /// If the buffer provided is not acceptable, this method will panic.
    pub fn fixed_result_with_buffer(self, scratchpad: &mut [u8]) -> GenericArray<u8, U32> {
        // Ensure that our alignment requirements are met.
        assert_eq!(scratchpad.as_ptr() as usize & (Self::SP_ALIGNMENT - 1), 0);
        assert_eq!(scratchpad.len(), Self::SP_SIZE);

        let mut state = A16([0u8; 200]);
        state
            .0
            .copy_from_slice(self.internal_hasher.fixed_result().as_slice());

        let sp: &mut [U64p] = unsafe { cast_mut(scratchpad) };
        run_v0(&mut state, sp);

        cn::keccakf(&mut state);
        cn::extra_hash(&state.0)
    }

    /// Compute a digest with a provided buffer.
    ///
    /// This method performs no allocations. See also: `Digest::digest()`.
    ///
    /// # Panics
    ///
    /// If the buffer provided is not acceptable, this method will panic.
    pub fn digest_with_buffer<B>(data: B, scratchpad: &mut [u8]) -> GenericArray<u8, U32>
    where
        B: AsRef<[u8]>,
    {
        let mut hasher: Self = Default::default();
        Input::input(&mut hasher, data);
        hasher.fixed_result_with_buffer(scratchpad)
    }

    /// Allocate a reusable scratchpad for use with the `_with_buffer` methods.
    ///
    /// # Usage
    /// ```
    /// # use cryptonight_miner::CryptoNight;
    /// let mut buffer = CryptoNight::allocate_scratchpad();
    ///
    /// CryptoNight::digest_with_buffer(b"Your data", buffer.as_mut());
    /// ```
    pub fn allocate_scratchpad() -> impl AsMut<[u8]> {
        Scratchpad::allocate(MemoryPolicy::NeverUse).expect("scratchpad allocation failed")
    }
}

fn run_v0(state: &mut A16<[u8; 200]>, scratchpad: &mut [U64p]) {
    #[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), feature = "aesni"))]
    {
        if aesni::available() {
            return unsafe { aesni::run_v0(state, scratchpad) };
        }
    }
    cn::run::<SoftAes, 0>(state, scratchpad, 0);
}

impl Input for CryptoNight {
    fn input<B: AsRef<[u8]>>(&mut self, data: B) {
        Input::input(&mut self.internal_hasher, data);
    }
}

impl Reset for CryptoNight {
    fn reset(&mut self) {
        Reset::reset(&mut self.internal_hasher);
    }
}

impl BlockInput for CryptoNight {
    type BlockSize = <sha3::Keccak256Full as BlockInput>::BlockSize;
}

impl FixedOutput for CryptoNight {
    type OutputSize = U32;

    fn fixed_result(self) -> GenericArray<u8, Self::OutputSize> {
        let mut scratchpad = Self::allocate_scratchpad();

        self.fixed_result_with_buffer(scratchpad.as_mut())
    }
}
