//! Mining worker threads.
//!
//! A worker owns its scratch pads for its whole lifetime and runs one
//! specialised hash function selected at startup. Between hashes it yields
//! to the scheduler; while stalled it sleeps in 100 ms steps; a new job is
//! detected through the pool's generation counter.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::job::{calc_nicehash_nonce, calc_start_nonce, digest_value, write_nonce, Share, ShareSink};
use crate::pool::GlobalWork;
use crate::scratchpad::MemoryPolicy;
use crate::telemetry::now_ms;
use crate::variant::Variant;
use crate::{select_double_hash_fn, select_hash_fn, CnContext, MinerError};

const STALL_POLL: Duration = Duration::from_millis(100);

/// How a worker iterates: one hash per pass, or two interleaved streams.
///
/// Double mode trades a second scratch pad for better instruction level
/// parallelism and pays off on cores with at least 4 MiB of cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    Single,
    Double,
}

/// Per-thread mining configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub mode: WorkMode,
    pub variant: Variant,
    /// Force the table-based AES implementation even when AES-NI exists.
    pub soft_aes: bool,
    /// Logical CPU to pin the thread to.
    pub affinity: Option<usize>,
    pub memory: MemoryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> WorkerConfig {
        WorkerConfig {
            mode: WorkMode::Single,
            variant: Variant::V2,
            soft_aes: false,
            affinity: None,
            memory: MemoryPolicy::PrintWarning,
        }
    }
}

impl WorkerConfig {
    /// One default single-mode worker per physical core, pinned in order.
    /// The usual starting point before a topology tuner takes over.
    pub fn per_physical_core() -> Vec<WorkerConfig> {
        (0..num_cpus::get_physical())
            .map(|cpu| WorkerConfig {
                affinity: Some(cpu),
                ..WorkerConfig::default()
            })
            .collect()
    }
}

/// The counters a worker publishes for telemetry readers. Both fields are
/// updated with relaxed stores every 16 hashes; readers tolerate the
/// bounded skew between them.
#[derive(Default)]
pub(crate) struct WorkerStats {
    pub hash_count: AtomicU64,
    pub timestamp: AtomicU64,
}

impl WorkerStats {
    fn publish(&self, hash_count: u64) {
        self.hash_count.store(hash_count, Ordering::Relaxed);
        self.timestamp.store(now_ms(), Ordering::Relaxed);
    }
}

pub(crate) struct Worker {
    pub stats: Arc<WorkerStats>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn a worker thread. Scratch pads are allocated on the new thread
    /// after CPU pinning, so first touch places them on the local NUMA
    /// node; allocation failures are reported back before this returns.
    pub(crate) fn start(
        thread_no: usize,
        config: WorkerConfig,
        global: Arc<GlobalWork>,
        sink: ShareSink,
    ) -> Result<Worker, MinerError> {
        let stats = Arc::new(WorkerStats::default());
        let thread_stats = stats.clone();
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(format!("cn-worker-{}", thread_no))
            .spawn(move || worker_main(thread_no, config, global, sink, thread_stats, ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Worker { stats, handle }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => Err(MinerError::Config(
                "worker thread died during startup".to_string(),
            )),
        }
    }

    pub(crate) fn join(self) {
        if self.handle.join().is_err() {
            warn!("worker thread panicked");
        }
    }
}

fn worker_main(
    thread_no: usize,
    config: WorkerConfig,
    global: Arc<GlobalWork>,
    sink: ShareSink,
    stats: Arc<WorkerStats>,
    ready_tx: mpsc::Sender<Result<(), MinerError>>,
) {
    if let Some(cpu) = config.affinity {
        pin_thread(cpu);
    }

    let mut contexts = Vec::new();
    let needed = match config.mode {
        WorkMode::Single => 1,
        WorkMode::Double => 2,
    };
    for _ in 0..needed {
        match CnContext::new(config.memory) {
            Ok(ctx) => contexts.push(ctx),
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        }
    }
    let _ = ready_tx.send(Ok(()));

    debug!(
        "worker {} running variant {} in {:?} mode",
        thread_no, config.variant, config.mode
    );

    match config.mode {
        WorkMode::Single => {
            let ctx = contexts.pop().expect("context allocated above");
            single_main(thread_no, &config, &global, &sink, &stats, ctx)
        }
        WorkMode::Double => {
            let ctx1 = contexts.pop().expect("context allocated above");
            let ctx0 = contexts.pop().expect("context allocated above");
            double_main(thread_no, &config, &global, &sink, &stats, ctx0, ctx1)
        }
    }
}

fn single_main(
    thread_no: usize,
    config: &WorkerConfig,
    global: &GlobalWork,
    sink: &ShareSink,
    stats: &WorkerStats,
    mut ctx: CnContext,
) {
    let hash_fn = select_hash_fn(!config.soft_aes, config.variant);

    let mut job = global.current_job();
    let mut job_no = 0u64;
    global.mark_consumed();

    let mut count = 0u64;
    let mut digest = [0u8; 32];

    while !global.quit() {
        if job.stall {
            // No work yet, either network latency or a socket problem.
            // Mining is this thread's reason to exist, so just wait.
            while global.generation() == job_no && !global.quit() {
                thread::sleep(STALL_POLL);
            }
            if global.quit() {
                break;
            }
            job = global.current_job();
            job_no += 1;
            global.mark_consumed();
            continue;
        }

        let mut blob = job.blob.clone();
        let mut nonce = if job.nicehash {
            calc_nicehash_nonce(
                job.nonce(),
                thread_no as u32,
                global.thread_count() as u32,
                job.resume_cnt,
            )
        } else {
            calc_start_nonce(thread_no as u32, global.thread_count() as u32, job.resume_cnt)
        };

        while global.generation() == job_no && !global.quit() {
            if count & 0xF == 0 {
                // Store stats every 16 hashes
                stats.publish(count);
            }
            count += 1;

            nonce = nonce.wrapping_add(1);
            write_nonce(&mut blob, nonce);

            hash_fn(&blob, &mut digest, &mut ctx);

            if digest_value(&digest) < job.target {
                sink(Share {
                    job_id: job.id.clone(),
                    nonce,
                    digest,
                    pool_id: job.pool_id,
                });
            }

            thread::yield_now();
        }

        if global.quit() {
            break;
        }
        job = global.current_job();
        job_no += 1;
        global.mark_consumed();
    }

    info!("worker {} stopped after {} hashes", thread_no, count);
}

fn double_main(
    thread_no: usize,
    config: &WorkerConfig,
    global: &GlobalWork,
    sink: &ShareSink,
    stats: &WorkerStats,
    mut ctx0: CnContext,
    mut ctx1: CnContext,
) {
    let hash_fn = select_double_hash_fn(!config.soft_aes, config.variant);

    let mut job = global.current_job();
    let mut job_no = 0u64;
    global.mark_consumed();

    let mut count = 0u64;
    let mut digests = [0u8; 64];

    while !global.quit() {
        if job.stall {
            while global.generation() == job_no && !global.quit() {
                thread::sleep(STALL_POLL);
            }
            if global.quit() {
                break;
            }
            job = global.current_job();
            job_no += 1;
            global.mark_consumed();
            continue;
        }

        let mut blob0 = job.blob.clone();
        let mut blob1 = job.blob.clone();
        let mut nonce = if job.nicehash {
            calc_nicehash_nonce(
                job.nonce(),
                thread_no as u32,
                global.thread_count() as u32,
                job.resume_cnt,
            )
        } else {
            calc_start_nonce(thread_no as u32, global.thread_count() as u32, job.resume_cnt)
        };

        while global.generation() == job_no && !global.quit() {
            if count & 0x7 == 0 {
                // Store stats every 16 hashes
                stats.publish(count);
            }
            count += 2;

            nonce = nonce.wrapping_add(1);
            let nonce0 = nonce;
            write_nonce(&mut blob0, nonce0);
            nonce = nonce.wrapping_add(1);
            let nonce1 = nonce;
            write_nonce(&mut blob1, nonce1);

            hash_fn(&blob0, &blob1, &mut digests, &mut ctx0, &mut ctx1);

            let first: [u8; 32] = {
                let mut d = [0u8; 32];
                d.copy_from_slice(&digests[..32]);
                d
            };
            if digest_value(&first) < job.target {
                sink(Share {
                    job_id: job.id.clone(),
                    nonce: nonce0,
                    digest: first,
                    pool_id: job.pool_id,
                });
            }

            let second: [u8; 32] = {
                let mut d = [0u8; 32];
                d.copy_from_slice(&digests[32..]);
                d
            };
            if digest_value(&second) < job.target {
                sink(Share {
                    job_id: job.id.clone(),
                    nonce: nonce1,
                    digest: second,
                    pool_id: job.pool_id,
                });
            }

            thread::yield_now();
        }

        if global.quit() {
            break;
        }
        job = global.current_job();
        job_no += 1;
        global.mark_consumed();
    }

    info!("worker {} stopped after {} hashes", thread_no, count);
}

#[cfg(target_os = "linux")]
fn pin_thread(cpu: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            warn!("failed to pin worker thread to cpu {}", cpu);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn pin_thread(cpu: usize) {
    warn!("thread affinity is only advisory on this platform (cpu {})", cpu);
}
