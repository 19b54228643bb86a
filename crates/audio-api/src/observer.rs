//! Observer contract and subscription handles.
//!
//! Consumers implement [`Observer`] to receive notifications. Subscribing
//! returns a [`Subscription`]; releasing it removes the observer.

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::DeliveryError;

/// A consumer of a stream of notifications.
///
/// `on_next` runs on a fan-out worker thread, never on the thread that
/// produced the notification. Returning an error or panicking does not affect
/// other observers; the failure is handed back through `on_error`.
pub trait Observer<T>: Send + Sync {
    /// Handles one notification.
    fn on_next(&self, value: &T) -> anyhow::Result<()>;

    /// Called when `on_next` for this observer failed.
    fn on_error(&self, error: DeliveryError) {
        tracing::debug!(error = %error, "Unhandled observer error");
    }

    /// Called once when the source completes. No notification follows.
    fn on_completed(&self) {}
}

/// Observer backed by a closure. Errors and completion use the default
/// handlers.
pub struct FnObserver<F> {
    f: F,
}

impl<F> FnObserver<F> {
    pub fn new<T>(f: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync,
    {
        Self { f }
    }
}

impl<T, F> Observer<T> for FnObserver<F>
where
    F: Fn(&T) -> anyhow::Result<()> + Send + Sync,
{
    fn on_next(&self, value: &T) -> anyhow::Result<()> {
        (self.f)(value)
    }
}

/// Everything an observer can be told, as a value.
#[derive(Debug)]
pub enum Notification<T> {
    /// A notification was delivered.
    Next(T),
    /// Delivery of an earlier notification failed.
    Error(DeliveryError),
    /// The source completed.
    Completed,
}

impl<T> Notification<T> {
    /// Returns the delivered value, if this is a `Next`.
    pub fn into_next(self) -> Option<T> {
        match self {
            Notification::Next(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true for `Completed`.
    pub fn is_completed(&self) -> bool {
        matches!(self, Notification::Completed)
    }
}

/// Observer that forwards every notification into an unbounded channel.
///
/// Useful for async consumers: the receiver can be awaited from any runtime.
pub struct ChannelObserver<T> {
    tx: mpsc::UnboundedSender<Notification<T>>,
}

impl<T> ChannelObserver<T> {
    /// Creates an observer and the receiver for its notifications.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<T> Observer<T> for ChannelObserver<T>
where
    T: Clone + Send + Sync,
{
    fn on_next(&self, value: &T) -> anyhow::Result<()> {
        self.tx
            .send(Notification::Next(value.clone()))
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }

    fn on_error(&self, error: DeliveryError) {
        if self.tx.send(Notification::Error(error)).is_err() {
            tracing::trace!("Notification receiver dropped before error delivery");
        }
    }

    fn on_completed(&self) {
        if self.tx.send(Notification::Completed).is_err() {
            tracing::trace!("Notification receiver dropped before completion");
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Capability to remove one observer from the source it subscribed to.
///
/// Dropping the handle unsubscribes. Releasing is idempotent: calling
/// [`unsubscribe`](Self::unsubscribe) more than once, or dropping after an
/// explicit unsubscribe, does nothing.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Mutex<Option<ReleaseFn>>,
}

impl Subscription {
    /// Creates a handle that runs `release` the first time it is released.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Creates an already-released handle.
    pub fn empty() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Removes the observer. Safe to call from inside the observer's own
    /// handler.
    pub fn unsubscribe(&self) {
        // Take before running so a release that re-enters this handle is a no-op.
        let release = self.release.lock().take();
        if let Some(release) = release {
            release();
        }
    }

    /// Returns true until the handle has been released.
    pub fn is_active(&self) -> bool {
        self.release.lock().is_some()
    }

    /// Consumes the handle without unsubscribing. The observer then stays
    /// registered until the source completes.
    pub fn detach(self) {
        self.release.lock().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
