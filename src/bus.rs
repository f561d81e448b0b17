use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tokio::sync::mpsc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Subscribe / unsubscribe / notify primitive shared by every collector.
///
/// `notify` copies the callback list before dispatching, so callbacks are
/// free to subscribe or unsubscribe (themselves included) while running.
///
/// Collectors hold `ordered()` across "mutate state, then notify" so that
/// subscribers see updates in the order they were applied, even with
/// concurrent writers.
pub struct ObservationBus<T> {
    subscribers: Arc<Mutex<Subscribers<T>>>,
    order: ReentrantMutex<()>,
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Handle returned by `subscribe`. Dropping it keeps the callback attached.
pub struct Subscription {
    id: u64,
    bus: Weak<dyn Detach>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T> Detach for Mutex<Subscribers<T>> {
    fn detach(&self, id: u64) {
        self.lock().entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

impl Subscription {
    /// Idempotent; a no-op once the bus itself is gone.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(self.id);
        }
    }
}

impl<T: 'static> ObservationBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
            order: ReentrantMutex::new(()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.attach(|_, _| Arc::new(callback) as Callback<T>)
    }

    fn attach<B>(&self, build: B) -> Subscription
    where
        B: FnOnce(u64, Weak<Mutex<Subscribers<T>>>) -> Callback<T>,
    {
        let weak = Arc::downgrade(&self.subscribers);
        let mut subs = self.subscribers.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        let callback = build(id, weak.clone());
        subs.entries.push((id, callback));

        Subscription { id, bus: weak }
    }

    /// Serializes one update and its notification against other writers.
    ///
    /// Take it before mutating collector state and keep it until `notify`
    /// returns. Re-entrant, so a subscriber may write back into the same
    /// collector from its callback.
    pub fn ordered(&self) -> ReentrantMutexGuard<'_, ()> {
        self.order.lock()
    }

    /// Deliver `event` to every subscriber attached when the call started.
    /// A panicking subscriber is logged and skipped.
    pub fn notify(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self
            .subscribers
            .lock()
            .entries
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!("telemetry subscriber panicked; continuing dispatch");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().entries.len()
    }
}

impl<T: Clone + Send + 'static> ObservationBus<T> {
    /// Queue-backed subscription for consumers on other tasks.
    /// Events are dropped (and logged) while the queue is full. The
    /// subscription detaches itself once the receiver is dropped.
    pub fn channel(&self, capacity: usize) -> (Subscription, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = self.attach(move |id, bus| {
            let callback: Callback<T> = Arc::new(move |event: &T| match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("telemetry channel full; dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if let Some(bus) = bus.upgrade() {
                        bus.detach(id);
                    }
                }
            });
            callback
        });
        (subscription, rx)
    }
}

impl<T: 'static> Default for ObservationBus<T> {
    fn default() -> Self {
        Self::new()
    }
}
