//! In-memory publish/subscribe bus.
//!
//! # Responsibilities
//! - Register and remove subscribers per topic
//! - Fan events out synchronously, in subscription order
//! - Keep one failing subscriber from starving its siblings
//!
//! # Design Decisions
//! - The bus is a handle: clones share one subscriber table
//! - Subscribers are snapshotted before fan-out, so a subscriber may
//!   (un)subscribe while being called without deadlocking
//! - A panicking subscriber is caught, logged and reported in the
//!   [`Delivery`]; the remaining subscribers still run

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::event::{Event, Topic};

/// Identifies one registration; pass it back to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Outcome of one [`EventBus::publish`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that returned normally.
    pub delivered: usize,
    /// Panic messages of subscribers that failed.
    pub failures: Vec<String>,
}

impl Delivery {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Publish/subscribe handle shared by a server and its listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<Topic, Vec<(SubscriptionId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a subscriber to `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for subscribers in listeners.values_mut() {
            if let Some(pos) = subscribers.iter().position(|(sid, _)| *sid == id) {
                subscribers.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every current subscriber of its topic.
    pub fn publish(&self, event: &Event) -> Delivery {
        let topic = event.topic();
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&topic)
            .map(|subs| subs.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut delivery = Delivery::default();
        for listener in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivery.delivered += 1,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(topic = %topic, error = %message, "Event subscriber panicked");
                    delivery.failures.push(message);
                }
            }
        }

        tracing::trace!(
            topic = %topic,
            delivered = delivery.delivered,
            failed = delivery.failures.len(),
            "Event published"
        );
        delivery
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<String, usize> = listeners
            .iter()
            .map(|(topic, subs)| (topic.to_string(), subs.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
