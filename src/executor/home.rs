//! Home-thread marshaling
//!
//! The home thread is whatever thread runs a `HomeLoop`: a UI thread pumping
//! `run_pending` once per frame, or a dedicated thread parked in `run`.
//! Other threads reach it through a `HomeContext`, typically the paired
//! `HomeQueue`.

use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tracing::debug;

use super::Job;

/// Why a job could not be queued right away. Either way the job is handed
/// back to the caller.
pub enum PostError {
    /// The home thread is behind; posting would have to wait.
    Full(Job),
    /// The home thread no longer accepts work.
    Closed(Job),
}

impl std::fmt::Debug for PostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostError::Full(_) => f.write_str("Full(..)"),
            PostError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// A thread that accepts work from other threads.
pub trait HomeContext: Send + Sync {
    /// Queues `job` for the home thread without blocking.
    fn try_post(&self, job: Job) -> Result<(), PostError>;

    /// Queues `job`, waiting for room if necessary. Hands the job back when
    /// the home thread no longer accepts work.
    ///
    /// May block, so callers inside an async context must leave it first.
    fn post(&self, job: Job) -> Result<(), Job>;

    /// Whether the calling thread is the home thread.
    fn is_current(&self) -> bool;
}

/// Sending half of a home-thread queue. Clones share the same queue.
#[derive(Clone)]
pub struct HomeQueue {
    tx: mpsc::Sender<Job>,
    thread: Arc<OnceLock<ThreadId>>,
}

/// Receiving half, driven by the home thread.
pub struct HomeLoop {
    rx: mpsc::Receiver<Job>,
    thread: Arc<OnceLock<ThreadId>>,
}

/// Creates a queue bounded to `capacity` pending jobs. `try_post` on a full
/// queue fails with `PostError::Full`; `post` waits for the home thread to
/// catch up.
pub fn home_queue(capacity: usize) -> (HomeQueue, HomeLoop) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let thread = Arc::new(OnceLock::new());
    (
        HomeQueue {
            tx,
            thread: thread.clone(),
        },
        HomeLoop { rx, thread },
    )
}

impl HomeQueue {
    /// Starts a dedicated home thread named `name` and returns its queue.
    /// The thread exits once every clone of the queue has been dropped.
    pub fn spawn(name: &str, capacity: usize) -> std::io::Result<(HomeQueue, JoinHandle<()>)> {
        let (queue, home) = home_queue(capacity);
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || home.run())?;
        // bind eagerly so `is_current` is correct before the first job runs
        let _ = queue.thread.set(join.thread().id());
        Ok((queue, join))
    }
}

impl HomeContext for HomeQueue {
    fn try_post(&self, job: Job) -> Result<(), PostError> {
        self.tx.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) => PostError::Full(job),
            TrySendError::Closed(job) => PostError::Closed(job),
        })
    }

    fn post(&self, job: Job) -> Result<(), Job> {
        self.tx.blocking_send(job).map_err(|err| err.0)
    }

    fn is_current(&self) -> bool {
        self.thread.get() == Some(&thread::current().id())
    }
}

impl HomeLoop {
    /// Runs jobs on the calling thread until every `HomeQueue` is dropped.
    pub fn run(mut self) {
        self.bind();
        debug!("home loop started");
        while let Some(job) = self.rx.blocking_recv() {
            job();
        }
        debug!("home loop finished");
    }

    /// Runs whatever is queued right now without blocking. Returns the
    /// number of jobs run.
    pub fn run_pending(&mut self) -> usize {
        self.bind();
        let mut ran = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return ran,
            }
        }
    }

    fn bind(&self) {
        let _ = self.thread.set(thread::current().id());
    }
}
