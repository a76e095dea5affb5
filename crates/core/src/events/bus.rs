//! In-process publish/subscribe hub.
//!
//! Every subscriber owns a bounded queue. Publishing walks a snapshot of the
//! registry and hands the event to each queue with `try_send`, so a slow or
//! vanished subscriber only ever loses its own events.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use arc_swap::ArcSwap;
use log::{debug, trace, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::{Event, EventKind, EventSink};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

pub type SubscriberId = u64;

#[derive(Clone)]
struct SubscriberEntry {
    id: SubscriberId,
    filter: Option<Arc<str>>,
    sender: mpsc::Sender<Arc<Event>>,
}

struct BusInner {
    // Read by publish without locking.
    snapshot: ArcSwap<Vec<SubscriberEntry>>,
    // Mutated only on subscribe/unsubscribe.
    registry: Mutex<BTreeMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BusInner {
    fn lock_registry(&self) -> MutexGuard<'_, BTreeMap<SubscriberId, SubscriberEntry>> {
        self.registry.lock().unwrap_or_else(|poisoned| {
            warn!("Event bus registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn rebuild_snapshot(&self, registry: &BTreeMap<SubscriberId, SubscriberEntry>) {
        let snapshot: Vec<SubscriberEntry> = registry.values().cloned().collect();
        self.snapshot.store(Arc::new(snapshot));
    }

    fn remove(&self, ids: &[SubscriberId]) -> usize {
        let mut registry = self.lock_registry();
        let removed = ids
            .iter()
            .filter(|id| registry.remove(id).is_some())
            .count();
        if removed > 0 {
            self.rebuild_snapshot(&registry);
        }
        removed
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    /// Queues that accepted the event.
    pub delivered: usize,
    /// Matching subscribers whose queue was full.
    pub dropped: usize,
    /// Subscribers whose filter did not match.
    pub skipped: usize,
    /// Subscribers found closed and removed during this publish.
    pub reaped: usize,
}

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("queue_capacity", &self.inner.queue_capacity)
            .finish()
    }
}

impl EventBus {
    /// Creates a bus whose subscribers each buffer up to `queue_capacity`
    /// undelivered events.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                snapshot: ArcSwap::from_pointee(Vec::new()),
                registry: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                queue_capacity: queue_capacity.max(1),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    /// Registers a subscriber. `filter` restricts delivery to events with that
    /// exact target; broadcast events bypass it.
    pub fn subscribe(&self, filter: Option<String>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.queue_capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let filter: Option<Arc<str>> = filter.map(Arc::from);

        {
            let mut registry = self.inner.lock_registry();
            registry.insert(
                id,
                SubscriberEntry {
                    id,
                    filter: filter.clone(),
                    sender,
                },
            );
            self.inner.rebuild_snapshot(&registry);
        }
        debug!("Subscriber {} registered (filter: {:?})", id, filter);

        Subscription {
            id,
            filter,
            receiver,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Removes a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.remove(&[id]) > 0;
        if removed {
            debug!("Subscriber {} unregistered", id);
        }
        removed
    }

    /// Hands `event` to every matching subscriber queue without waiting.
    pub fn publish(&self, event: Event) -> PublishReport {
        let event = Arc::new(event);
        let snapshot = self.inner.snapshot.load_full();
        let mut report = PublishReport::default();
        let mut closed = Vec::new();

        for entry in snapshot.iter() {
            if !event.matches(entry.filter.as_deref()) {
                report.skipped += 1;
                continue;
            }
            match entry.sender.try_send(Arc::clone(&event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    debug!(
                        "Subscriber {} queue full, dropping {} event {}",
                        entry.id, event.kind, event.id
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(entry.id),
            }
        }

        if !closed.is_empty() {
            report.reaped = self.inner.remove(&closed);
        }

        self.inner
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.inner
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        trace!(
            "Published {} event {} to '{}': {:?}",
            event.kind,
            event.id,
            event.target,
            report
        );
        report
    }

    /// Builds and publishes an event on behalf of a state-mutating caller.
    pub fn notify(
        &self,
        kind: EventKind,
        target: impl Into<String>,
        user_id: Option<String>,
        payload: Map<String, Value>,
        message: impl Into<String>,
        broadcast: bool,
    ) -> (Uuid, PublishReport) {
        let mut event = Event::new(kind, target, message).with_payload(payload);
        event.user_id = user_id;
        event.broadcast = broadcast;
        let id = event.id;
        (id, self.publish(event))
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.snapshot.load().len()
    }

    /// Total number of queue deliveries since the bus was created.
    pub fn delivered_total(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Total number of events dropped on full queues since the bus was created.
    pub fn dropped_total(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        self.publish(event);
    }
}

/// A registered subscriber's receiving end. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    filter: Option<Arc<str>>,
    receiver: mpsc::Receiver<Arc<Event>>,
    bus: Weak<BusInner>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Waits for the next event. Returns `None` once the subscription has
    /// been removed from the bus and its queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }

    /// Events currently waiting in this subscriber's queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            if inner.remove(&[self.id]) > 0 {
                debug!("Subscriber {} dropped", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(target: &str, message: &str) -> Event {
        Event::new(EventKind::CharacterUpdated, target, message)
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe(None);
        let mut b = bus.subscribe(None);
        assert_eq!(bus.subscriber_count(), 2);

        let report = bus.publish(event("character:characters/zed", "one"));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);

        assert_eq!(a.try_recv().unwrap().message, "one");
        assert_eq!(b.try_recv().unwrap().message, "one");
        assert!(a.try_recv().is_none());
    }

    #[test]
    fn test_filter_and_broadcast() {
        let bus = EventBus::new(8);
        let mut zed = bus.subscribe(Some("character:characters/zed".to_string()));
        let mut all = bus.subscribe(None);

        let report = bus.publish(event("character:characters/ana", "ana"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert!(zed.try_recv().is_none());
        assert_eq!(all.try_recv().unwrap().message, "ana");

        let report = bus.publish(event("system", "maintenance").broadcast());
        assert_eq!(report.delivered, 2);
        assert_eq!(zed.try_recv().unwrap().message, "maintenance");
    }

    #[test]
    fn test_full_queue_drops_newest_for_that_subscriber_only() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe(None);
        let mut fast = bus.subscribe(None);

        for i in 0..3 {
            bus.publish(event("t", &format!("e{}", i)));
            assert_eq!(fast.try_recv().unwrap().message, format!("e{}", i));
        }

        assert_eq!(slow.pending(), 2);
        assert_eq!(slow.try_recv().unwrap().message, "e0");
        assert_eq!(slow.try_recv().unwrap().message, "e1");
        assert!(slow.try_recv().is_none());
        assert_eq!(bus.dropped_total(), 1);
        assert_eq!(bus.delivered_total(), 5);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe(None);
        let id = sub.id();

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);

        let report = bus.publish(event("t", "after"));
        assert_eq!(report.delivered, 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new(4);
        let keep = bus.subscribe(None);
        {
            let _gone = bus.subscribe(None);
            assert_eq!(bus.subscriber_count(), 2);
        }
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(event("t", "x")).delivered, 1);
        drop(keep);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_notify_builds_event() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe(Some("party:parties/7".to_string()));

        let mut payload = Map::new();
        payload.insert("size".into(), Value::from(4));
        let (id, report) = bus.notify(
            EventKind::PartyCreated,
            "party:parties/7",
            Some("u-9".to_string()),
            payload,
            "party created",
            false,
        );
        assert_eq!(report.delivered, 1);

        let received = sub.try_recv().unwrap();
        assert_eq!(received.id, id);
        assert_eq!(received.kind, EventKind::PartyCreated);
        assert_eq!(received.user_id.as_deref(), Some("u-9"));
        assert_eq!(received.payload["size"], 4);
        assert!(!received.broadcast);
    }

    #[tokio::test]
    async fn test_order_preserved_per_subscriber() {
        let bus = EventBus::new(64);
        let mut sub = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    bus.publish(event("t", &i.to_string()));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 50 {
            let next = sub.recv().await.unwrap();
            seen.push(next.message.parse::<u32>().unwrap());
        }
        publisher.await.unwrap();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_while_publishing() {
        let bus = EventBus::new(1024);
        let mut handles = Vec::new();

        for _ in 0..4 {
            let bus = bus.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    bus.publish(event("t", &i.to_string()));
                }
            }));
        }
        let subs: Vec<Subscription> = (0..20).map(|_| bus.subscribe(None)).collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(bus.subscriber_count(), 20);
        drop(subs);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
