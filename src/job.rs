//! Work units exchanged with the external pool client.
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::variant::Variant;
use crate::MinerError;

/// Byte offset of the little-endian u32 nonce window inside the work blob.
pub const NONCE_OFFSET: usize = 39;

/// Smallest blob a worker will mine. The nonce window must fit, and variants
/// 1 and 2 read their tweak seed at offset 35.
pub const MIN_BLOB_LEN: usize = NONCE_OFFSET + 4;

/// Longest job identifier accepted from the pool client.
pub const MAX_JOB_ID_LEN: usize = 64;

/// One unit of work as delivered by the pool client. Immutable once
/// published; a new job replaces it atomically.
#[derive(Debug, Clone, Default)]
pub struct Job {
    /// Opaque pool-side identifier, echoed back in shares.
    pub id: String,
    /// The work blob carrying the nonce window at offset 39.
    pub blob: Vec<u8>,
    /// Difficulty target: a share is valid iff the last 8 digest bytes,
    /// little endian, are strictly below it.
    pub target: u64,
    /// Which pool connection the job belongs to.
    pub pool_id: usize,
    /// Restrict the nonce search to the low 24 bits, preserving the top
    /// byte assigned by the pool.
    pub nicehash: bool,
    /// Seed for start nonce selection after a reconnect.
    pub resume_cnt: u32,
    /// No work available; workers sleep until a real job arrives.
    pub stall: bool,
}

impl Job {
    /// The placeholder published before the pool client has found work.
    pub fn stalled() -> Job {
        Job {
            stall: true,
            ..Job::default()
        }
    }

    /// Check that the blob can be mined with the given variant.
    pub fn validate(&self, variant: Variant) -> Result<(), MinerError> {
        if self.stall {
            return Ok(());
        }
        if self.id.len() > MAX_JOB_ID_LEN {
            return Err(MinerError::InvalidJob(format!(
                "job id of {} bytes exceeds the {} byte limit",
                self.id.len(),
                MAX_JOB_ID_LEN
            )));
        }
        let min_len = MIN_BLOB_LEN.max(variant.min_input_len());
        if self.blob.len() < min_len {
            return Err(MinerError::InvalidJob(format!(
                "blob of {} bytes is too short for variant {} (need {})",
                self.blob.len(),
                variant,
                min_len
            )));
        }
        Ok(())
    }

    /// The nonce currently embedded in the blob.
    pub fn nonce(&self) -> u32 {
        LittleEndian::read_u32(&self.blob[NONCE_OFFSET..NONCE_OFFSET + 4])
    }
}

/// Patch the nonce window of a work blob.
#[inline]
pub(crate) fn write_nonce(blob: &mut [u8], nonce: u32) {
    LittleEndian::write_u32(&mut blob[NONCE_OFFSET..NONCE_OFFSET + 4], nonce);
}

/// The last 8 bytes of a digest as the value compared against the target.
#[inline]
pub(crate) fn digest_value(digest: &[u8; 32]) -> u64 {
    LittleEndian::read_u64(&digest[24..32])
}

/// Start nonces are bit-reversed thread counters, so concurrent workers and
/// resumed sessions spread evenly over the 32 bit space.
pub(crate) fn calc_start_nonce(thread_no: u32, thread_count: u32, resume_cnt: u32) -> u32 {
    thread_no
        .wrapping_add(thread_count.wrapping_mul(resume_cnt))
        .reverse_bits()
}

/// Nicehash assigns the top nonce byte per connection; spread the counter
/// over the remaining 24 bits only.
pub(crate) fn calc_nicehash_nonce(
    orig_nonce: u32,
    thread_no: u32,
    thread_count: u32,
    resume_cnt: u32,
) -> u32 {
    (orig_nonce & 0xFF00_0000) | (calc_start_nonce(thread_no, thread_count, resume_cnt) >> 8)
}

/// A nonce whose digest beat the target, ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub job_id: String,
    pub nonce: u32,
    pub digest: [u8; 32],
    pub pool_id: usize,
}

/// Callback consuming found shares, typically forwarding them to the pool
/// client.
pub type ShareSink = Arc<dyn Fn(Share) + Send + Sync>;
