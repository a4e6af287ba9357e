//! The Event Bus: in-process publish/subscribe with per-subscriber FIFO,
//! best-effort delivery, and predicate-based filtering.

use crate::event::Event;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use meridian_core::SessionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// A live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    bus: EventBus,
    receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Receive the next event matching this subscription's predicate.
    ///
    /// Returns `None` once the subscription has been dropped for being too
    /// slow (the bus closed the channel instead of blocking publishers).
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.subscribers.remove(&self.id);
    }
}

struct Subscriber {
    event_glob: GlobMatcher,
    session_filter: Option<SessionId>,
    sender: mpsc::Sender<Event>,
}

/// Cloneable handle to the shared event bus state.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<u64, Subscriber>>,
    next_id: Arc<AtomicU64>,
    queue_max: usize,
}

impl EventBus {
    /// Create a new bus. `queue_max` bounds each subscriber's mailbox;
    /// a subscriber that falls `queue_max` events behind is dropped.
    #[must_use]
    pub fn new(queue_max: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_max,
        }
    }

    /// Subscribe with an event-name glob (e.g. `"session.*"`, `"*"`) and an
    /// optional session filter (only events for that session are delivered).
    pub fn subscribe(&self, event_name_pattern: &str, session_filter: Option<SessionId>) -> Subscription {
        let glob = Glob::new(event_name_pattern)
            .unwrap_or_else(|_| Glob::new("*").expect("literal glob is valid"))
            .compile_matcher();
        let (tx, rx) = mpsc::channel(self.queue_max.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(
            id,
            Subscriber {
                event_glob: glob,
                session_filter,
                sender: tx,
            },
        );
        Subscription {
            id,
            bus: self.clone(),
            receiver: rx,
        }
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Delivery is best-effort: a subscriber whose mailbox is full is
    /// dropped (its channel closed) rather than blocking this call. Ordering
    /// of events for one session is preserved per subscriber because this
    /// function enqueues to each subscriber's channel in call order and
    /// never reorders.
    pub fn publish(&self, event: Event) {
        let name = event.name();
        let session_id = event.session_id();
        let mut dropped = Vec::new();
        for entry in self.subscribers.iter() {
            let sub = entry.value();
            if !sub.event_glob.is_match(name) {
                continue;
            }
            if let Some(filter) = sub.session_filter {
                if session_id != Some(filter) {
                    continue;
                }
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.sender.try_send(event.clone()) {
                warn!(subscriber_id = *entry.key(), event = name, "dropping slow event bus subscriber");
                dropped.push(*entry.key());
            }
        }
        for id in dropped {
            // Removing the sender closes the channel; the subscriber's next
            // `recv()` observes `None` and knows it was dropped.
            self.subscribers.remove(&id);
        }
    }

    /// Current subscriber count, for status/metrics endpoints.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::SessionId;

    #[tokio::test]
    async fn delivers_matching_events_in_order() {
        let bus = EventBus::new(16);
        let session_id = SessionId::new();
        let mut sub = bus.subscribe("session.*", Some(session_id));

        bus.publish(Event::SessionMessage {
            session_id,
            seq: 1,
            role: "user".into(),
        });
        bus.publish(Event::SessionMessage {
            session_id,
            seq: 2,
            role: "assistant".into(),
        });

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        match (first, second) {
            (Event::SessionMessage { seq: s1, .. }, Event::SessionMessage { seq: s2, .. }) => {
                assert_eq!(s1, 1);
                assert_eq!(s2, 2);
            }
            _ => panic!("unexpected event shape"),
        }
    }

    #[tokio::test]
    async fn filters_by_session_and_glob() {
        let bus = EventBus::new(16);
        let wanted = SessionId::new();
        let other = SessionId::new();
        let mut sub = bus.subscribe("session.message", Some(wanted));

        bus.publish(Event::SessionMessage {
            session_id: other,
            seq: 1,
            role: "user".into(),
        });
        bus.publish(Event::JobRunStarted {
            job_id: meridian_core::JobId::new(),
        });
        bus.publish(Event::SessionMessage {
            session_id: wanted,
            seq: 1,
            role: "user".into(),
        });

        let event = sub.recv().await.unwrap();
        assert_eq!(event.session_id(), Some(wanted));
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_blocking() {
        let bus = EventBus::new(1);
        let session_id = SessionId::new();
        let mut sub = bus.subscribe("session.*", Some(session_id));

        for seq in 0..5 {
            bus.publish(Event::SessionMessage {
                session_id,
                seq,
                role: "user".into(),
            });
        }

        // Drain whatever made it through, then the channel should close.
        while sub.recv().await.is_some() {}
        assert_eq!(bus.subscriber_count(), 0);
    }
}
