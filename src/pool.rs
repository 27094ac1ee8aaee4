//! The thread pool that feeds workers and aggregates their telemetry.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use log::{info, warn};

use crate::job::{Job, ShareSink};
use crate::telemetry::Telemetry;
use crate::worker::{WorkMode, Worker, WorkerConfig};
use crate::MinerError;

const CONSUME_POLL: Duration = Duration::from_millis(100);

/// The single-writer/multi-reader snapshot of the current job.
///
/// The slot is written only by `switch_work`; workers detect publication
/// through the generation counter and then copy the job out under the lock.
/// A stale generation read only delays the pickup of a new job, so workers
/// poll it relaxed.
pub(crate) struct GlobalWork {
    job: RwLock<Job>,
    generation: AtomicU64,
    consume_cnt: AtomicU64,
    quit: AtomicBool,
    thread_count: usize,
}

impl GlobalWork {
    fn new(initial_job: Job, thread_count: usize) -> GlobalWork {
        GlobalWork {
            job: RwLock::new(initial_job),
            generation: AtomicU64::new(0),
            consume_cnt: AtomicU64::new(0),
            quit: AtomicBool::new(false),
            thread_count,
        }
    }

    pub(crate) fn current_job(&self) -> Job {
        self.job
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_consumed(&self) {
        self.consume_cnt.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn quit(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.thread_count
    }
}

/// Handle to a running set of mining workers.
///
/// The pool client pushes jobs with `switch_work`, collects shares through
/// the sink passed at startup, and reads hashrates after `sample_telemetry`.
pub struct MinerPool {
    global: Arc<GlobalWork>,
    workers: Vec<Worker>,
    configs: Vec<WorkerConfig>,
    telemetry: Mutex<Telemetry>,
}

impl MinerPool {
    /// Construct one worker per config and start hashing `initial_job`.
    ///
    /// Use `Job::stalled()` as the initial job to start the workers idle.
    /// Fails fatally when a config is invalid, a scratch pad cannot be
    /// allocated under its policy, or the initial job does not fit a
    /// worker's variant.
    pub fn start(
        initial_job: Job,
        configs: &[WorkerConfig],
        sink: ShareSink,
    ) -> Result<MinerPool, MinerError> {
        if configs.is_empty() {
            return Err(MinerError::Config("no worker threads configured".to_string()));
        }
        for config in configs {
            initial_job.validate(config.variant)?;
        }

        let global = Arc::new(GlobalWork::new(initial_job, configs.len()));

        let mut workers = Vec::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            let kind = match config.mode {
                WorkMode::Single => "single",
                WorkMode::Double => "double",
            };
            match config.affinity {
                Some(cpu) => info!("Starting {} thread, affinity: {}.", kind, cpu),
                None => info!("Starting {} thread, no affinity.", kind),
            }
            match Worker::start(i, config.clone(), global.clone(), sink.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Startup is all or nothing; wind down the threads that
                    // already came up.
                    global.quit.store(true, Ordering::SeqCst);
                    for worker in workers {
                        worker.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(MinerPool {
            global,
            workers,
            configs: configs.to_vec(),
            telemetry: Mutex::new(Telemetry::new(configs.len())),
        })
    }

    /// Publish a new job to all workers.
    ///
    /// Waits until every worker has observed the previous job first; with a
    /// realistic pool cadence the wait never triggers, it only guards
    /// against jobs arriving faster than workers poll. Invalid jobs are
    /// rejected and the previous job stays current.
    pub fn switch_work(&self, job: Job) -> Result<(), MinerError> {
        for config in &self.configs {
            if let Err(e) = job.validate(config.variant) {
                warn!("dropping job {:?}, workers keep the previous one: {}", job.id, e);
                return Err(e);
            }
        }

        while self.global.consume_cnt.load(Ordering::SeqCst) < self.workers.len() as u64 {
            thread::sleep(CONSUME_POLL);
        }

        {
            let mut slot = self
                .global
                .job
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = job;
        }
        self.global.consume_cnt.store(0, Ordering::SeqCst);
        self.global.generation.fetch_add(1, Ordering::Release);

        Ok(())
    }

    /// Ask all workers to exit at their next outer-loop check.
    pub fn mark_quit(&self) {
        self.global.quit.store(true, Ordering::SeqCst);
    }

    /// Signal quit and join all worker threads.
    pub fn stop(mut self) {
        self.mark_quit();
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Copy every worker's published `(hash_count, timestamp)` pair into the
    /// telemetry rings. Call this periodically, then query the rates.
    pub fn sample_telemetry(&self) {
        let mut telemetry = self
            .telemetry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (i, worker) in self.workers.iter().enumerate() {
            let hashes = worker.stats.hash_count.load(Ordering::Relaxed);
            let stamp = worker.stats.timestamp.load(Ordering::Relaxed);
            if stamp != 0 {
                telemetry.push(i, hashes, stamp);
            }
        }
    }

    /// Rolling hashrate of one worker, NaN until enough samples exist.
    pub fn hashrate(&self, window_ms: u64, thread: usize) -> f64 {
        self.telemetry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .rate(window_ms, thread)
    }

    /// Rolling hashrate of the whole pool, NaN until enough samples exist.
    pub fn total_hashrate(&self, window_ms: u64) -> f64 {
        self.telemetry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .total_rate(window_ms)
    }
}
