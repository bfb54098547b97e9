//! Typed domain events and their subscribers
//!
//! The timeline queues [`DomainEvent`]s as it mutates; the recording session
//! drains that queue into an [`EventBus`] after every callback it handles.

use crate::session::SessionState;
use crate::types::{BehaviorEvent, EventIndex, TriggerId};
use serde::Serialize;
use std::fmt;

/// Something observable happened to a timeline or its session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    EventOpened {
        trigger_id: TriggerId,
        label: String,
        onset: u64,
    },
    EventClosed {
        index: EventIndex,
        event: BehaviorEvent,
        /// The offset was forced to one frame past the onset
        adjusted: bool,
    },
    EventTruncated {
        index: EventIndex,
        previous_offset: u64,
        offset: u64,
    },
    EventRemoved {
        index: EventIndex,
        event: BehaviorEvent,
    },
    AnchorInserted {
        index: EventIndex,
        position_ms: u64,
    },
    TimelineCleared,
    SessionStateChanged {
        from: SessionState,
        to: SessionState,
    },
}

/// Receives domain events in delivery order
pub trait TimelineObserver {
    fn on_event(&mut self, event: &DomainEvent);
}

impl<F> TimelineObserver for F
where
    F: FnMut(&DomainEvent),
{
    fn on_event(&mut self, event: &DomainEvent) {
        self(event)
    }
}

/// Ordered list of subscribers
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Box<dyn TimelineObserver>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn TimelineObserver>) {
        self.observers.push(observer);
    }

    pub fn publish(&mut self, event: &DomainEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }

    pub fn publish_all(&mut self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.publish(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_bus_delivers_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut bus = EventBus::new();
        bus.subscribe(Box::new(move |event: &DomainEvent| {
            sink.borrow_mut().push(event.clone());
        }));

        bus.publish_all(vec![
            DomainEvent::TimelineCleared,
            DomainEvent::AnchorInserted {
                index: EventIndex(0),
                position_ms: 40,
            },
        ]);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], DomainEvent::TimelineCleared);
        assert!(matches!(seen[1], DomainEvent::AnchorInserted { position_ms: 40, .. }));
    }

    #[test]
    fn test_domain_event_serializes_tagged() {
        let json = serde_json::to_value(DomainEvent::SessionStateChanged {
            from: SessionState::Idle,
            to: SessionState::Waiting,
        })
        .unwrap();
        assert_eq!(json["type"], "session_state_changed");
        assert_eq!(json["to"], "waiting");
    }
}
