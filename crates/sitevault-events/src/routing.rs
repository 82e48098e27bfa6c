//! Event bus routing helpers.

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio_stream::wrappers::BroadcastStream;

/// Stream wrapper used by subscribers.
pub type EventStream = BroadcastStream<EventEnvelope>;

/// Shared event bus built on top of `tokio::broadcast`.
///
/// Publishing never blocks; when the channel overflows, lagging subscribers
/// lose the oldest events while the replay ring keeps the latest
/// `replay_capacity` envelopes.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    replay_capacity: usize,
    next_id: Arc<Mutex<EventId>>,
}

impl EventBus {
    /// Construct a bus with a custom replay capacity.
    ///
    /// # Panics
    ///
    /// Panics if `replay_capacity` is zero.
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        assert!(replay_capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(replay_capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(replay_capacity))),
            replay_capacity,
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to the bus, returning a stream of new events.
    ///
    /// When `last_event_id` is supplied, buffered events newer than it are
    /// re-broadcast before live events.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        let mut rx = self.sender.subscribe();
        if let Some(last) = last_event_id {
            self.replay(last, &mut rx);
        }
        BroadcastStream::new(rx)
    }

    /// Publish a new event and return the assigned id.
    pub fn publish(&self, event: Event) -> EventId {
        let mut next = self
            .next_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = *next;
        *next = next.saturating_add(1);
        drop(next);

        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        {
            let mut replay = self.lock_replay();
            if replay.len() == self.replay_capacity {
                let _ = replay.pop_front();
            }
            replay.push_back(envelope.clone());
        }
        let _ = self.sender.send(envelope);
        id
    }

    /// Last event id observed in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_replay().back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        let replay = self.lock_replay();
        replay.iter().filter(|env| env.id > id).cloned().collect()
    }

    fn replay(&self, last_event_id: EventId, rx: &mut Receiver<EventEnvelope>) {
        let past = self.backlog_since(last_event_id);
        for env in past {
            let _ = rx.try_recv();
            if self.sender.send(env).is_err() {
                break;
            }
        }
    }

    fn lock_replay(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{JobProgress, OutcomeKind, ResourceKind};
    use tokio_stream::StreamExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn publish_and_replay_from_id() {
        let bus = EventBus::with_capacity(4);
        let first = bus.publish(Event::JobQueued {
            job_id: Uuid::nil(),
            total: 2,
        });
        let second = bus.publish(Event::ProgressChanged {
            job_id: Uuid::nil(),
            progress: JobProgress::queued(2),
        });

        assert_eq!(bus.last_event_id(), Some(second));
        let backlog = bus.backlog_since(first);
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].id, second);
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest_envelopes() {
        let bus = EventBus::with_capacity(2);
        for processed in 0..3 {
            let _ = bus.publish(Event::JobCancelled {
                job_id: Uuid::nil(),
                processed,
            });
        }
        let backlog = bus.backlog_since(0);
        let ids: Vec<_> = backlog.iter().map(|env| env.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn subscribe_streams_live_events() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);
        let id = bus.publish(Event::ResourceFinished {
            job_id: Uuid::nil(),
            url: "https://example.com/app.js".into(),
            kind: ResourceKind::Js,
            outcome: OutcomeKind::Success,
        });
        let envelope = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(envelope.id, id);
        assert!(matches!(envelope.event, Event::ResourceFinished { .. }));
    }
}
