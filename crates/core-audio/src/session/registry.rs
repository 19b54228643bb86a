//! Subscriber registries and fan-out rounds.
//!
//! A [`Registry`] holds the observers of one notification kind. Events
//! published to it are queued and drained one round at a time on the
//! [`FanoutDispatcher`], so rounds of one registry never overlap and run in
//! publish order, while different registries proceed independently.
//!
//! Locking:
//! - `entries` guards the observer map. Held only to insert, remove or
//!   snapshot; never while calling an observer.
//! - `round_gate` is held for a whole delivery round and for completion, so
//!   completion waits for an in-flight round on another thread. It is
//!   reentrant so an observer may dispose the session from its own handler.
//! - `pending` guards the queue of events awaiting delivery.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use audio_api::{AudioError, DeliveryError, Observer, Subscription};
use parking_lot::{Mutex, ReentrantMutex};

use crate::config::{DispatchConfig, OverflowPolicy};
use crate::dispatch::FanoutDispatcher;
use crate::panic_message;

/// Identifies one registry entry.
type EntryId = u64;

/// Bounds on the pending-event queue of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueuePolicy {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl From<&DispatchConfig> for QueuePolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            capacity: config.queue_capacity.max(1),
            overflow: config.overflow,
        }
    }
}

struct Entries<T> {
    next_id: EntryId,
    observers: BTreeMap<EntryId, Arc<dyn Observer<T>>>,
    closed: bool,
}

struct Pending<T> {
    events: VecDeque<T>,
    draining: bool,
}

struct RegistryInner<T> {
    /// Notification kind, for logging.
    kind: &'static str,
    entries: Mutex<Entries<T>>,
    round_gate: ReentrantMutex<()>,
    pending: Mutex<Pending<T>>,
    closed: AtomicBool,
    dropped: AtomicU64,
    queue: QueuePolicy,
}

/// Observers of one notification kind.
pub(crate) struct Registry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Registry<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(kind: &'static str, queue: QueuePolicy) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                kind,
                entries: Mutex::new(Entries {
                    next_id: 0,
                    observers: BTreeMap::new(),
                    closed: false,
                }),
                round_gate: ReentrantMutex::new(()),
                pending: Mutex::new(Pending {
                    events: VecDeque::new(),
                    draining: false,
                }),
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
                queue,
            }),
        }
    }

    /// Adds an observer. The returned handle removes it when released.
    ///
    /// # Errors
    /// [`AudioError::Disposed`] once the registry has been completed.
    pub fn subscribe(&self, observer: Arc<dyn Observer<T>>) -> Result<Subscription, AudioError> {
        let id = {
            let mut entries = self.inner.entries.lock();
            if entries.closed {
                return Err(AudioError::Disposed);
            }
            let id = entries.next_id;
            entries.next_id += 1;
            entries.observers.insert(id, observer);
            id
        };

        tracing::trace!(kind = self.inner.kind, entry = id, "Subscriber added");

        let registry: Weak<RegistryInner<T>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        }))
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().observers.len()
    }

    /// Events discarded because the pending queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Queues `event` for a fan-out round and makes sure a drain is scheduled.
    ///
    /// Never blocks beyond short queue locks and never calls observers, so it
    /// is safe on a native callback thread.
    pub fn publish(&self, event: T, dispatcher: &FanoutDispatcher) {
        if self.inner.closed.load(Ordering::SeqCst) {
            tracing::trace!(kind = self.inner.kind, "Event published after completion, ignoring");
            return;
        }

        let start_drain = {
            let mut pending = self.inner.pending.lock();
            if self.inner.queue.overflow == OverflowPolicy::DropOldest
                && pending.events.len() >= self.inner.queue.capacity
            {
                pending.events.pop_front();
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    kind = self.inner.kind,
                    capacity = self.inner.queue.capacity,
                    dropped = dropped,
                    "Pending event queue full, dropping oldest event"
                );
            }
            pending.events.push_back(event);
            !std::mem::replace(&mut pending.draining, true)
        };

        if start_drain {
            let inner = Arc::clone(&self.inner);
            if let Err(e) = dispatcher.submit(move || inner.drain()) {
                // Leave the events queued; the next publish retries the drain.
                self.inner.pending.lock().draining = false;
                tracing::warn!(kind = self.inner.kind, error = %e, "Failed to schedule fan-out round");
            }
        }
    }

    /// Completes every observer, clears the registry and refuses further
    /// subscriptions and events. Returns the number of observers completed.
    ///
    /// Waits for a round in flight on another thread. Calling it again
    /// completes nobody.
    pub fn complete(&self) -> usize {
        self.inner.complete()
    }
}

impl<T> RegistryInner<T>
where
    T: Send + Sync + 'static,
{
    fn remove(&self, id: EntryId) {
        let removed = self.entries.lock().observers.remove(&id);
        if removed.is_some() {
            tracing::trace!(kind = self.kind, entry = id, "Subscriber removed");
        }
    }

    fn drain(&self) {
        loop {
            let event = {
                let mut pending = self.pending.lock();
                match pending.events.pop_front() {
                    Some(event) => event,
                    None => {
                        pending.draining = false;
                        return;
                    }
                }
            };
            self.deliver(&event);
        }
    }

    /// Runs one fan-out round. Returns the number of successful deliveries.
    fn deliver(&self, event: &T) -> usize {
        let _round = self.round_gate.lock();

        let snapshot: Vec<(EntryId, Arc<dyn Observer<T>>)> = {
            let entries = self.entries.lock();
            if entries.closed {
                return 0;
            }
            entries
                .observers
                .iter()
                .map(|(id, observer)| (*id, Arc::clone(observer)))
                .collect()
        };

        let mut delivered = 0;
        for (id, observer) in &snapshot {
            // Completed from inside a handler of this round
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer.on_next(event)));
            let error = match outcome {
                Ok(Ok(())) => {
                    delivered += 1;
                    continue;
                }
                Ok(Err(e)) => DeliveryError::Handler(e),
                Err(payload) => DeliveryError::Panicked(panic_message(payload.as_ref())),
            };

            tracing::warn!(kind = self.kind, entry = id, error = %error, "Subscriber failed");
            if panic::catch_unwind(AssertUnwindSafe(|| observer.on_error(error))).is_err() {
                tracing::warn!(kind = self.kind, entry = id, "Subscriber error handler panicked");
            }
        }

        tracing::trace!(
            kind = self.kind,
            subscribers = snapshot.len(),
            delivered = delivered,
            "Fan-out round finished"
        );
        delivered
    }

    fn complete(&self) -> usize {
        let _round = self.round_gate.lock();

        let observers = {
            let mut entries = self.entries.lock();
            entries.closed = true;
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut entries.observers)
        };
        let discarded = {
            let mut pending = self.pending.lock();
            let n = pending.events.len();
            pending.events.clear();
            n
        };

        for (id, observer) in &observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer.on_completed())).is_err() {
                tracing::warn!(kind = self.kind, entry = id, "Subscriber completion handler panicked");
            }
        }

        tracing::debug!(
            kind = self.kind,
            completed = observers.len(),
            discarded_events = discarded,
            "Registry completed"
        );
        observers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recv_timeout, wait_until};
    use audio_api::{ChannelObserver, FnObserver, Notification};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn registry() -> Registry<u32> {
        Registry::new(
            "test",
            QueuePolicy {
                capacity: 1024,
                overflow: OverflowPolicy::DropOldest,
            },
        )
    }

    fn counting_observer(count: &Arc<AtomicUsize>) -> Arc<dyn Observer<u32>> {
        let count = Arc::clone(count);
        Arc::new(FnObserver::new(move |_: &u32| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[test]
    fn test_subscribe_and_release() {
        let registry = registry();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = registry.subscribe(counting_observer(&count)).unwrap();
        assert_eq!(registry.len(), 1);

        sub.unsubscribe();
        assert_eq!(registry.len(), 0);

        // Idempotent
        sub.unsubscribe();
        drop(sub);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_same_observer_subscribed_twice_gets_two_entries() {
        let registry = registry();
        let count = Arc::new(AtomicUsize::new(0));
        let observer = counting_observer(&count);

        let first = registry.subscribe(Arc::clone(&observer)).unwrap();
        let _second = registry.subscribe(observer).unwrap();
        assert_eq!(registry.len(), 2);

        first.unsubscribe();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_publish_delivers_to_all_subscribers() {
        let registry = registry();
        let dispatcher = FanoutDispatcher::with_workers(2).unwrap();

        let (a, mut rx_a) = ChannelObserver::<u32>::new();
        let (b, mut rx_b) = ChannelObserver::<u32>::new();
        let _sa = registry.subscribe(Arc::new(a)).unwrap();
        let _sb = registry.subscribe(Arc::new(b)).unwrap();

        registry.publish(7, &dispatcher);

        assert_eq!(recv_timeout(&mut rx_a, TIMEOUT).and_then(Notification::into_next), Some(7));
        assert_eq!(recv_timeout(&mut rx_b, TIMEOUT).and_then(Notification::into_next), Some(7));
    }

    #[test]
    fn test_rounds_preserve_publish_order() {
        let registry = registry();
        let dispatcher = FanoutDispatcher::with_workers(4).unwrap();

        let (observer, mut rx) = ChannelObserver::<u32>::new();
        let _sub = registry.subscribe(Arc::new(observer)).unwrap();

        for i in 0..200 {
            registry.publish(i, &dispatcher);
        }

        for expected in 0..200 {
            let got = recv_timeout(&mut rx, TIMEOUT).and_then(Notification::into_next);
            assert_eq!(got, Some(expected));
        }
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let registry = registry();
        let dispatcher = FanoutDispatcher::with_workers(1).unwrap();

        struct Faulty {
            tx: std::sync::mpsc::Sender<String>,
            panic: bool,
        }
        impl Observer<u32> for Faulty {
            fn on_next(&self, _: &u32) -> anyhow::Result<()> {
                if self.panic {
                    panic!("handler blew up");
                }
                anyhow::bail!("handler refused")
            }
            fn on_error(&self, error: DeliveryError) {
                self.tx.send(error.to_string()).unwrap();
            }
        }

        let (err_tx, err_rx) = std::sync::mpsc::channel();
        let _s1 = registry
            .subscribe(Arc::new(Faulty {
                tx: err_tx.clone(),
                panic: false,
            }))
            .unwrap();
        let _s2 = registry
            .subscribe(Arc::new(Faulty {
                tx: err_tx,
                panic: true,
            }))
            .unwrap();
        let (good, mut rx) = ChannelObserver::<u32>::new();
        let _s3 = registry.subscribe(Arc::new(good)).unwrap();

        registry.publish(1, &dispatcher);
        registry.publish(2, &dispatcher);

        // The healthy subscriber, registered last, sees both rounds
        assert_eq!(recv_timeout(&mut rx, TIMEOUT).and_then(Notification::into_next), Some(1));
        assert_eq!(recv_timeout(&mut rx, TIMEOUT).and_then(Notification::into_next), Some(2));

        let mut errors: Vec<String> = (0..4).map(|_| err_rx.recv_timeout(TIMEOUT).unwrap()).collect();
        errors.sort();
        assert!(errors[0].contains("handler refused"));
        assert!(errors[3].contains("handler blew up"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_unsubscribe_from_inside_handler() {
        let registry = Arc::new(registry());
        let dispatcher = FanoutDispatcher::with_workers(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let handler_slot = Arc::clone(&slot);
        let handler_count = Arc::clone(&count);
        let observer = Arc::new(FnObserver::new(move |_: &u32| {
            handler_count.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = handler_slot.lock().take() {
                sub.unsubscribe();
            }
            Ok(())
        }));
        *slot.lock() = Some(registry.subscribe(observer).unwrap());

        registry.publish(1, &dispatcher);
        assert!(wait_until(TIMEOUT, || registry.len() == 0));

        let (watcher, mut rx) = ChannelObserver::<u32>::new();
        let _watcher = registry.subscribe(Arc::new(watcher)).unwrap();
        registry.publish(2, &dispatcher);
        assert_eq!(recv_timeout(&mut rx, TIMEOUT).and_then(Notification::into_next), Some(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_complete_notifies_once_and_closes() {
        let registry = registry();
        let dispatcher = FanoutDispatcher::with_workers(1).unwrap();

        let (observer, mut rx) = ChannelObserver::<u32>::new();
        let sub = registry.subscribe(Arc::new(observer)).unwrap();

        assert_eq!(registry.complete(), 1);
        assert_eq!(registry.complete(), 0);
        assert_eq!(registry.len(), 0);

        assert!(recv_timeout(&mut rx, TIMEOUT).unwrap().is_completed());

        registry.publish(5, &dispatcher);
        assert!(recv_timeout(&mut rx, Duration::from_millis(100)).is_none());

        let (late, _rx) = ChannelObserver::<u32>::new();
        assert!(matches!(
            registry.subscribe(Arc::new(late)),
            Err(AudioError::Disposed)
        ));

        // Releasing after completion is harmless
        sub.unsubscribe();
    }

    #[test]
    fn test_drop_oldest_when_queue_full() {
        let registry = Registry::new(
            "test",
            QueuePolicy {
                capacity: 2,
                overflow: OverflowPolicy::DropOldest,
            },
        );
        let dispatcher = FanoutDispatcher::with_workers(1).unwrap();

        // Block the drain on the first event so later ones pile up
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        let observer = Arc::new(FnObserver::new(move |value: &u32| {
            if *value == 0 {
                gate_rx.lock().recv().ok();
            }
            seen_tx.send(*value).ok();
            Ok(())
        }));
        let _sub = registry.subscribe(observer).unwrap();

        registry.publish(0, &dispatcher);
        // Wait for the round for 0 to be in flight
        assert!(wait_until(TIMEOUT, || registry.inner.pending.lock().events.is_empty()));

        for i in 1..=4 {
            registry.publish(i, &dispatcher);
        }
        assert_eq!(registry.dropped_events(), 2);
        gate_tx.send(()).unwrap();

        let seen: Vec<u32> = (0..3).map(|_| seen_rx.recv_timeout(TIMEOUT).unwrap()).collect();
        assert_eq!(seen, vec![0, 3, 4]);
    }

    #[test]
    fn test_concurrent_subscribes_are_all_recorded() {
        let registry = Arc::new(registry());
        let threads = 16;
        let per_thread = 50;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let count = Arc::new(AtomicUsize::new(0));
                    (0..per_thread)
                        .map(|_| registry.subscribe(counting_observer(&count)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let subs: Vec<Subscription> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(registry.len(), threads * per_thread);
        drop(subs);
        assert_eq!(registry.len(), 0);
    }
}
