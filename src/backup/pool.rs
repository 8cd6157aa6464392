use crate::backup::job::Job;
use crate::backup::notifications::Notifier;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl PoolReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Default)]
struct PoolState {
    pending: Mutex<usize>,
    drained: Condvar,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl PoolState {
    fn report(&self) -> PoolReport {
        PoolReport {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Marks one queued job as finished when dropped, also when the job panics.
struct JobGuard {
    state: Arc<PoolState>,
    succeeded: Option<bool>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        match self.succeeded {
            Some(true) => self.state.succeeded.fetch_add(1, Ordering::SeqCst),
            _ => self.state.failed.fetch_add(1, Ordering::SeqCst),
        };
        let mut pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending -= 1;
        if *pending == 0 {
            self.state.drained.notify_all();
        }
    }
}

/// Fixed number of worker threads draining one FIFO queue of jobs.
///
/// With a single worker (the default) jobs run strictly one after another
/// in submission order.
pub struct WorkerPool {
    pool: ThreadPool,
    notifier: Arc<dyn Notifier>,
    state: Arc<PoolState>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(size.max(1))
            .thread_name(|i| format!("backup-worker-{i}"))
            .panic_handler(|_| tracing::error!("Backup job panicked, counting it as failed"))
            .build()?;
        tracing::debug!("Started {} backup worker(s)", pool.current_num_threads());

        Ok(Self {
            pool,
            notifier,
            state: Arc::new(PoolState::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Queues `job` without waiting for it to start.
    pub fn submit(&self, job: Job) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::pool_closed());
        }

        *self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;

        let state = self.state.clone();
        let notifier = self.notifier.clone();
        self.pool.spawn_fifo(move || {
            let mut guard = JobGuard {
                state,
                succeeded: None,
            };
            guard.succeeded = Some(job.run(notifier.as_ref()).is_ok());
        });
        Ok(())
    }

    /// Blocks until every queued and running job has finished.
    pub fn wait(&self) -> PoolReport {
        let pending = self
            .state
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _drained = self
            .state
            .drained
            .wait_while(pending, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        self.state.report()
    }

    /// Stops accepting jobs. Already queued jobs still run.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn shutdown(self) -> PoolReport {
        self.close();
        self.wait()
    }
}
