//! Thread-affinity executor
//!
//! Runs a unit of work in one of three places:
//! - `run_here`: inline on the calling thread
//! - `run_on_home`: marshaled to the installed home context, optionally
//!   waiting for it to finish; inline when no home context is installed
//! - `run_async`: on the worker pool, fire-and-forget
//!
//! The dispatcher decides which one each delivery uses.

pub mod home;
pub mod pool;

use std::sync::{Arc, PoisonError, RwLock};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tokio::task;
use tracing::{debug, warn};

pub use home::{HomeContext, HomeLoop, HomeQueue, PostError, home_queue};
pub use pool::WorkerPool;

/// A unit of work. Jobs are synchronous and run exactly once.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs inline, on the home thread, or on the worker pool.
///
/// The home context can be swapped at any time; jobs already queued on the
/// previous one still run there.
pub struct Executor {
    pool: WorkerPool,
    home: RwLock<Option<Arc<dyn HomeContext>>>,
}

impl Executor {
    pub fn new(pool: WorkerPool) -> Self {
        Self {
            pool,
            home: RwLock::new(None),
        }
    }

    pub fn with_threads(worker_threads: usize) -> std::io::Result<Self> {
        Ok(Self::new(WorkerPool::new(worker_threads)?))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self::new(WorkerPool::from_handle(handle))
    }

    pub fn set_home(&self, home: Option<Arc<dyn HomeContext>>) {
        *self.home.write().unwrap_or_else(PoisonError::into_inner) = home;
    }

    pub fn home(&self) -> Option<Arc<dyn HomeContext>> {
        self.home
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_home(&self) -> bool {
        self.home
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn run_here(&self, job: Job) {
        job()
    }

    /// Runs `job` on the home thread. With `wait`, blocks until it has run.
    ///
    /// Falls back to the calling thread when no home context is installed,
    /// when the caller already is the home thread, or when the home thread
    /// has stopped accepting work. Without `wait` the caller never blocks:
    /// a job that does not fit in the home queue is handed to the worker
    /// pool, which waits for room instead.
    pub fn run_on_home(&self, job: Job, wait: bool) {
        let Some(home) = self.home() else {
            return self.run_here(job);
        };
        if home.is_current() {
            return self.run_here(job);
        }

        if wait {
            self.post_and_wait(home, job);
        } else {
            self.post_to_home(home, job);
        }
    }

    fn post_to_home(&self, home: Arc<dyn HomeContext>, job: Job) {
        match home.try_post(job) {
            Ok(()) => {}
            Err(PostError::Full(job)) => {
                debug!("home queue full; deferring the job to the worker pool");
                self.pool.spawn(Box::new(move || {
                    if let Err(job) = home.post(job) {
                        warn!("home context stopped before a deferred job was queued");
                        job();
                    }
                }));
            }
            Err(PostError::Closed(job)) => {
                warn!("home context rejected a job; running it on the publishing thread");
                job();
            }
        }
    }

    fn post_and_wait(&self, home: Arc<dyn HomeContext>, job: Job) {
        let blocking = Blocking::current();
        if blocking == Blocking::Forbidden {
            warn!("cannot block a current-thread runtime; running the home job here");
            return job();
        }

        let (done_tx, done_rx) = oneshot::channel::<()>();
        let job: Job = Box::new(move || {
            job();
            let _ = done_tx.send(());
        });
        let pending = match home.try_post(job) {
            Ok(()) => None,
            Err(PostError::Full(job)) => Some(job),
            Err(PostError::Closed(job)) => {
                warn!("home context rejected a job; running it on the publishing thread");
                return job();
            }
        };

        let outcome = blocking.run(move || -> Result<bool, Job> {
            if let Some(job) = pending {
                home.post(job)?;
            }
            Ok(done_rx.blocking_recv().is_ok())
        });
        match outcome {
            Ok(true) => {}
            Ok(false) => warn!("home context dropped a job without running it"),
            Err(job) => {
                warn!("home context rejected a job; running it on the publishing thread");
                job();
            }
        }
    }

    pub fn run_async(&self, job: Job) {
        self.pool.spawn(job)
    }
}

/// Whether the calling thread may block, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Blocking {
    /// Outside any runtime.
    Allowed,
    /// Inside a multi-thread runtime; blocking goes through `block_in_place`.
    InPlace,
    /// Inside a current-thread runtime, which would stall.
    Forbidden,
}

impl Blocking {
    fn current() -> Self {
        match Handle::try_current() {
            Err(_) => Blocking::Allowed,
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => Blocking::InPlace,
                _ => Blocking::Forbidden,
            },
        }
    }

    fn run<R>(self, f: impl FnOnce() -> R) -> R {
        match self {
            Blocking::InPlace => task::block_in_place(f),
            Blocking::Allowed | Blocking::Forbidden => f(),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("pool", &self.pool)
            .field("has_home", &self.has_home())
            .finish()
    }
}
