use std::fmt;

use tokio::runtime::{Builder, Handle, Runtime};

use super::Job;

/// Worker pool for fire-and-forget deliveries.
///
/// Jobs are synchronous and may block, so they run through `spawn_blocking`.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl WorkerPool {
    /// Starts a private runtime with up to `worker_threads` blocking threads.
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(worker_threads.max(1))
            .thread_name("signalhub-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    /// Uses an existing runtime instead of starting one.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            handle,
        }
    }

    pub fn spawn(&self, job: Job) {
        // detached; completion is never awaited
        drop(self.handle.spawn_blocking(job));
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // dropping a runtime from async context panics
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("owned", &self.runtime.is_some())
            .finish()
    }
}
