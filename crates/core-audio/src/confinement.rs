//! Single-thread confinement for native calls.
//!
//! The audio subsystem's objects may only be touched from the thread that
//! created them. [`ConfinementThread`] owns one OS thread and runs every
//! submitted action on it, in submission order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use audio_api::AudioError;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::panic_message;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A dedicated thread that executes every native call.
///
/// [`invoke`](Self::invoke) blocks the caller until the action has run and
/// must not be used from inside an async task; use
/// [`invoke_async`](Self::invoke_async) there.
pub struct ConfinementThread {
    /// Thread name, for logging.
    name: String,

    /// Sender for queued jobs. `None` once shut down.
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,

    /// Id of the confinement thread.
    thread_id: ThreadId,

    /// Join handle, taken on shutdown.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ConfinementThread {
    /// Starts a new confinement thread with the given name.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Arc<Self>> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!(thread = %thread_name, "Confinement thread started");

            // Drains queued jobs after shutdown until the channel is empty
            while let Some(job) = rx.blocking_recv() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                    tracing::error!(
                        thread = %thread_name,
                        panic = %panic_message(payload.as_ref()),
                        "Confined job panicked"
                    );
                }
            }

            tracing::debug!(thread = %thread_name, "Confinement thread stopped");
        })?;

        let thread_id = handle.thread().id();

        Ok(Arc::new(Self {
            name,
            tx: Mutex::new(Some(tx)),
            thread_id,
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Returns the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true when called from the confinement thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Panics unless called from the confinement thread.
    #[track_caller]
    pub fn assert_current(&self) {
        assert!(
            self.is_current(),
            "native call made off the confinement thread `{}` (from {:?})",
            self.name,
            thread::current().name()
        );
    }

    /// Returns false once [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Runs `action` on the confinement thread and waits for its result.
    ///
    /// Called from the confinement thread itself, the action runs inline.
    ///
    /// # Errors
    /// - [`AudioError::Shutdown`] if the thread has been shut down.
    /// - [`AudioError::ActionPanicked`] if the action panicked.
    pub fn invoke<F, R>(&self, action: F) -> Result<R, AudioError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(action());
        }

        let reply_rx = self.enqueue_with_reply(action)?;
        match reply_rx.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(AudioError::ActionPanicked(message)),
            Err(_) => Err(AudioError::Shutdown),
        }
    }

    /// Async variant of [`invoke`](Self::invoke).
    pub async fn invoke_async<F, R>(&self, action: F) -> Result<R, AudioError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Ok(action());
        }

        let reply_rx = self.enqueue_with_reply(action)?;
        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(AudioError::ActionPanicked(message)),
            Err(_) => Err(AudioError::Shutdown),
        }
    }

    /// Queues `action` without waiting for it.
    ///
    /// # Errors
    /// [`AudioError::Shutdown`] if the thread has been shut down; the action
    /// is dropped.
    pub fn post<F>(&self, action: F) -> Result<(), AudioError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(action))
    }

    /// Stops accepting work, lets queued jobs finish and joins the thread.
    ///
    /// Calling it again is a no-op. Called from the confinement thread
    /// itself, the thread is detached instead of joined.
    pub fn shutdown(&self) {
        let tx = self.tx.lock().take();
        if tx.is_none() {
            return;
        }
        drop(tx);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if self.is_current() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!(thread = %self.name, "Confinement thread panicked on exit");
            }
        }

        tracing::debug!(thread = %self.name, "Confinement thread joined");
    }

    fn enqueue(&self, job: Job) -> Result<(), AudioError> {
        let tx = self.tx.lock();
        let tx = tx.as_ref().ok_or(AudioError::Shutdown)?;
        tx.send(job).map_err(|_| AudioError::Shutdown)
    }

    fn enqueue_with_reply<F, R>(
        &self,
        action: F,
    ) -> Result<oneshot::Receiver<Result<R, String>>, AudioError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(action))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = reply_tx.send(result);
        }))?;
        Ok(reply_rx)
    }
}

impl Drop for ConfinementThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConfinementThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfinementThread")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
