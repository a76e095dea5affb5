//! Event sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::Event;

/// Anything that accepts published events.
///
/// `emit()` must be fast and non-blocking, and a failure to deliver must
/// never affect the operation that produced the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event.
#[derive(Clone, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: Event) {}
}

/// Collects emitted events for assertions.
#[derive(Clone, Default)]
pub struct MockEventSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MockEventSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_noop_sink_does_not_panic() {
        let sink = NoOpEventSink;
        sink.emit(Event::new(EventKind::SystemNotification, "system", "hello"));
    }

    #[test]
    fn test_mock_sink_collects_events() {
        let sink = MockEventSink::new();
        assert!(sink.is_empty());

        sink.emit(Event::new(EventKind::UserJoined, "party:parties/1", "joined"));
        sink.emit(Event::new(EventKind::UserLeft, "party:parties/1", "left"));
        sink.emit(Event::new(EventKind::PartyDeleted, "party:parties/1", "deleted"));
        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events()[2].kind, EventKind::PartyDeleted);

        sink.clear();
        assert!(sink.is_empty());
    }
}
