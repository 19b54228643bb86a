//! Worker pool for notification fan-out.
//!
//! Native callbacks must return immediately, so delivery to subscribers is
//! handed to a [`FanoutDispatcher`]. The dispatcher owns a private tokio
//! runtime and runs jobs on its blocking pool, capped at the configured
//! number of workers. Jobs beyond that wait in the runtime's queue.
//!
//! The runtime is current-thread and never driven: no async tasks run on it,
//! so the only threads it creates are blocking-pool workers.

use std::sync::Arc;

use audio_api::AudioError;
use tokio::runtime::{Builder, Runtime};

use crate::config::DispatchConfig;

/// Thread name prefix for fan-out workers.
const WORKER_THREAD_NAME: &str = "audio-fanout";

/// Bounded pool of threads that deliver notifications.
pub struct FanoutDispatcher {
    /// Runtime whose blocking pool runs the jobs. Taken on drop.
    runtime: Option<Runtime>,

    /// Maximum number of concurrently running jobs.
    workers: usize,
}

impl FanoutDispatcher {
    /// Creates a dispatcher from configuration.
    pub fn new(config: &DispatchConfig) -> std::io::Result<Arc<Self>> {
        Self::with_workers(config.workers)
    }

    /// Creates a dispatcher running at most `workers` jobs at once.
    pub fn with_workers(workers: usize) -> std::io::Result<Arc<Self>> {
        let workers = workers.max(1);
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(workers)
            .thread_name(WORKER_THREAD_NAME)
            .build()?;

        tracing::debug!(workers = workers, "Fan-out dispatcher started");

        Ok(Arc::new(Self {
            runtime: Some(runtime),
            workers,
        }))
    }

    /// Returns the worker limit.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues a job for execution on a worker thread.
    ///
    /// # Errors
    /// [`AudioError::Shutdown`] if the dispatcher is being dropped.
    pub fn submit<F>(&self, job: F) -> Result<(), AudioError>
    where
        F: FnOnce() + Send + 'static,
    {
        let runtime = self.runtime.as_ref().ok_or(AudioError::Shutdown)?;
        // The join handle is not needed; rounds report their own failures.
        drop(runtime.spawn_blocking(job));
        Ok(())
    }
}

impl Drop for FanoutDispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Does not wait, so dropping from a worker or async context is fine.
            runtime.shutdown_background();
            tracing::debug!("Fan-out dispatcher stopped");
        }
    }
}

impl std::fmt::Debug for FanoutDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutDispatcher")
            .field("workers", &self.workers)
            .finish()
    }
}
