//! Timeline store
//!
//! Closed events live in stable slots ordered by close time. Removing an event
//! vacates its slot, so an [`EventIndex`] never shifts once handed out.

use crate::error::TimelineError;
use crate::notify::DomainEvent;
use crate::timeline::corrector::DurationCorrector;
use crate::types::{
    is_statistic_label, ms_to_secs, BehaviorEvent, BehaviorStatistics, EventIndex, TriggerId,
    WallTime,
};
use log::{debug, warn};
use std::collections::BTreeMap;

/// One recording session's events
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    slots: Vec<Option<BehaviorEvent>>,
    open: BTreeMap<TriggerId, BehaviorEvent>,
    test_duration_secs: Option<f64>,
    outbox: Vec<DomainEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a timeline from already-closed events, kept in the given order.
    ///
    /// Events without an offset are skipped.
    pub fn from_events(events: impl IntoIterator<Item = BehaviorEvent>) -> Self {
        let slots = events
            .into_iter()
            .filter(|event| !event.is_open())
            .map(Some)
            .collect();
        Self {
            slots,
            ..Self::default()
        }
    }

    /// Open an event for `trigger_id` at `position_ms`
    pub fn start(
        &mut self,
        trigger_id: TriggerId,
        label: &str,
        position_ms: u64,
        now: WallTime,
    ) -> Result<(), TimelineError> {
        if self.open.contains_key(&trigger_id) {
            warn!("Ignoring start for '{}': event already open", trigger_id);
            return Err(TimelineError::AlreadyOpen(trigger_id));
        }

        debug!("Opened '{}' ({}) at {}ms", label, trigger_id, position_ms);
        self.outbox.push(DomainEvent::EventOpened {
            trigger_id: trigger_id.clone(),
            label: label.to_string(),
            onset: position_ms,
        });
        let event = BehaviorEvent::open(trigger_id.clone(), label, position_ms, now);
        self.open.insert(trigger_id, event);
        Ok(())
    }

    /// Close the open event for `trigger_id`, correcting its offset
    pub fn end(
        &mut self,
        trigger_id: &TriggerId,
        position_ms: u64,
        now: WallTime,
        frame_duration_ms: u32,
    ) -> Result<EventIndex, TimelineError> {
        let Some(event) = self.open.remove(trigger_id) else {
            warn!("Ignoring end for '{}': no open event", trigger_id);
            return Err(TimelineError::NotOpen(trigger_id.clone()));
        };
        Ok(self.close(event, position_ms, now, frame_duration_ms))
    }

    /// Close every open event, earliest onset first
    pub fn close_all(
        &mut self,
        position_ms: u64,
        now: WallTime,
        frame_duration_ms: u32,
    ) -> Vec<EventIndex> {
        let mut pending: Vec<BehaviorEvent> = std::mem::take(&mut self.open).into_values().collect();
        pending.sort_by(|a, b| a.onset.cmp(&b.onset).then_with(|| a.trigger_id.cmp(&b.trigger_id)));
        pending
            .into_iter()
            .map(|event| self.close(event, position_ms, now, frame_duration_ms))
            .collect()
    }

    fn close(
        &mut self,
        mut event: BehaviorEvent,
        position_ms: u64,
        now: WallTime,
        frame_duration_ms: u32,
    ) -> EventIndex {
        let correction = DurationCorrector::correct(&event, position_ms, now, frame_duration_ms);
        event.offset = Some(correction.offset);
        event.wall_offset = Some(now);

        let index = EventIndex(self.slots.len());
        debug!(
            "Closed '{}' {}: {}-{}ms",
            event.label, index, event.onset, correction.offset
        );
        self.outbox.push(DomainEvent::EventClosed {
            index,
            event: event.clone(),
            adjusted: correction.adjusted,
        });
        self.slots.push(Some(event));
        index
    }

    /// Append a `RecordingStart` anchor with zero duration
    pub fn insert_anchor(&mut self, position_ms: u64) -> EventIndex {
        let index = EventIndex(self.slots.len());
        self.slots.push(Some(BehaviorEvent::anchor(position_ms)));
        self.outbox.push(DomainEvent::AnchorInserted { index, position_ms });
        index
    }

    /// Move the offset of a closed event, returning the previous offset
    pub fn update(&mut self, index: EventIndex, new_offset: u64) -> Result<u64, TimelineError> {
        let event = self
            .slots
            .get_mut(index.0)
            .and_then(Option::as_mut)
            .ok_or(TimelineError::InvalidIndex(index.0))?;

        if new_offset < event.onset {
            return Err(TimelineError::NegativeDuration {
                onset: event.onset,
                offset: new_offset,
            });
        }

        let previous_offset = event.offset.unwrap_or(event.onset);
        event.offset = Some(new_offset);
        self.outbox.push(DomainEvent::EventTruncated {
            index,
            previous_offset,
            offset: new_offset,
        });
        Ok(previous_offset)
    }

    /// Remove a closed event, vacating its slot
    pub fn remove(&mut self, index: EventIndex) -> Result<BehaviorEvent, TimelineError> {
        let event = self
            .slots
            .get_mut(index.0)
            .and_then(Option::take)
            .ok_or(TimelineError::InvalidIndex(index.0))?;
        self.outbox.push(DomainEvent::EventRemoved {
            index,
            event: event.clone(),
        });
        Ok(event)
    }

    /// Drop all closed and open events
    pub fn clear(&mut self) {
        self.slots.clear();
        self.open.clear();
        self.outbox.push(DomainEvent::TimelineCleared);
    }

    pub fn get(&self, index: EventIndex) -> Option<&BehaviorEvent> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    /// Closed events in close order with their handles
    pub fn closed_events(&self) -> impl Iterator<Item = (EventIndex, &BehaviorEvent)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|event| (EventIndex(i), event)))
    }

    /// Owned copy of the closed events in close order
    pub fn snapshot(&self) -> Vec<BehaviorEvent> {
        self.closed_events().map(|(_, event)| event.clone()).collect()
    }

    pub fn open_events(&self) -> impl Iterator<Item = &BehaviorEvent> {
        self.open.values()
    }

    pub fn is_open(&self, trigger_id: &TriggerId) -> bool {
        self.open.contains_key(trigger_id)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn closed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.closed_count() == 0
    }

    /// Onset of the most recently inserted anchor
    pub fn latest_anchor(&self) -> Option<u64> {
        self.slots
            .iter()
            .rev()
            .flatten()
            .find(|event| event.is_anchor())
            .map(|event| event.onset)
    }

    /// Closed events plus in-progress ones drawn up to `position_ms`
    pub fn events_with_active(&self, position_ms: u64) -> Vec<BehaviorEvent> {
        let mut events = self.snapshot();
        events.extend(self.open.values().map(|event| {
            let mut active = event.clone();
            active.offset = Some(position_ms.max(event.onset));
            active
        }));
        events
    }

    /// Count, total and mean duration per label over closed events
    pub fn behavior_statistics(&self) -> BTreeMap<String, BehaviorStatistics> {
        let mut stats: BTreeMap<String, BehaviorStatistics> = BTreeMap::new();
        for (_, event) in self.closed_events() {
            if !is_statistic_label(&event.label) {
                continue;
            }
            let entry = stats.entry(event.label.clone()).or_default();
            entry.count += 1;
            entry.total_secs += event.duration_ms().map(ms_to_secs).unwrap_or(0.0);
        }
        for entry in stats.values_mut() {
            entry.mean_secs = entry.total_secs / f64::from(entry.count);
        }
        stats
    }

    pub fn test_duration_secs(&self) -> Option<f64> {
        self.test_duration_secs
    }

    pub fn set_test_duration_secs(&mut self, secs: Option<f64>) {
        self.test_duration_secs = secs;
    }

    /// Take the domain events queued since the last drain
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn wall(secs: f64) -> WallTime {
        WallTime::from_secs(secs)
    }

    #[test]
    fn test_start_twice_fails_without_side_effects() {
        let mut timeline = Timeline::new();
        let key = TriggerId::from('o');
        timeline.start(key.clone(), "Attack bites", 100, wall(1.0)).unwrap();
        timeline.drain_events();

        let err = timeline.start(key.clone(), "Attack bites", 200, wall(2.0));
        assert!(matches!(err, Err(TimelineError::AlreadyOpen(_))));
        assert_eq!(timeline.open_count(), 1);
        assert_eq!(timeline.open_events().next().map(|e| e.onset), Some(100));
        assert!(timeline.drain_events().is_empty());
    }

    #[test]
    fn test_end_not_open_fails() {
        let mut timeline = Timeline::new();
        let err = timeline.end(&TriggerId::from('j'), 100, wall(1.0), 33);
        assert!(matches!(err, Err(TimelineError::NotOpen(_))));
        assert_eq!(timeline.closed_count(), 0);
    }

    #[test]
    fn test_open_never_holds_duplicate_triggers() {
        let mut timeline = Timeline::new();
        let keys = ['o', 'j', 'o', 'o', 'j', 'p', 'o', 'p', 'j', 'j'];
        let mut position = 0;
        for (step, key) in keys.iter().enumerate() {
            position += 100;
            let trigger = TriggerId::from(*key);
            if step % 3 == 2 {
                let _ = timeline.end(&trigger, position, wall(position as f64 / 1000.0), 33);
            } else {
                let _ = timeline.start(trigger, "x", position, wall(position as f64 / 1000.0));
            }
            let mut triggers: Vec<_> = timeline.open_events().map(|e| e.trigger_id.clone()).collect();
            let before = triggers.len();
            triggers.dedup();
            assert_eq!(before, triggers.len());
            assert!(timeline.open_count() <= 3);
        }
    }

    #[test]
    fn test_closed_events_ordered_by_close_time() {
        let mut timeline = Timeline::new();
        timeline.start(TriggerId::from('o'), "Attack bites", 0, wall(0.0)).unwrap();
        timeline.start(TriggerId::from('q'), "Chasing", 200, wall(0.2)).unwrap();
        timeline.end(&TriggerId::from('q'), 400, wall(0.4), 33).unwrap();
        timeline.end(&TriggerId::from('o'), 900, wall(0.9), 33).unwrap();

        let labels: Vec<_> = timeline.snapshot().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["Chasing".to_string(), "Attack bites".to_string()]);
    }

    #[test]
    fn test_fast_release_gets_one_frame() {
        let mut timeline = Timeline::new();
        let key = TriggerId::from('o');
        timeline.start(key.clone(), "Attack bites", 1000, wall(3.0)).unwrap();
        let index = timeline.end(&key, 1000, wall(3.005), 33).unwrap();
        let event = timeline.get(index).unwrap();
        assert_eq!(event.offset, Some(1033));
    }

    #[test]
    fn test_remove_keeps_other_indices_stable() {
        let mut timeline = Timeline::from_events(vec![
            BehaviorEvent::closed(TriggerId::from('o'), "A", 0, 100),
            BehaviorEvent::closed(TriggerId::from('j'), "B", 200, 300),
            BehaviorEvent::closed(TriggerId::from('p'), "C", 400, 500),
        ]);
        let removed = timeline.remove(EventIndex(1)).unwrap();
        assert_eq!(removed.label, "B");
        assert_eq!(timeline.get(EventIndex(2)).map(|e| e.label.as_str()), Some("C"));
        assert!(timeline.get(EventIndex(1)).is_none());
        assert!(matches!(timeline.remove(EventIndex(1)), Err(TimelineError::InvalidIndex(1))));
        assert_eq!(timeline.closed_count(), 2);
    }

    #[test]
    fn test_update_rejects_negative_duration() {
        let mut timeline = Timeline::from_events(vec![BehaviorEvent::closed(
            TriggerId::from('o'),
            "A",
            100,
            500,
        )]);
        assert!(matches!(
            timeline.update(EventIndex(0), 50),
            Err(TimelineError::NegativeDuration { .. })
        ));
        assert_eq!(timeline.update(EventIndex(0), 300).unwrap(), 500);
        assert_eq!(timeline.get(EventIndex(0)).and_then(|e| e.offset), Some(300));
    }

    #[test]
    fn test_close_all_orders_by_onset() {
        let mut timeline = Timeline::new();
        timeline.start(TriggerId::from('q'), "Chasing", 300, wall(0.3)).unwrap();
        timeline.start(TriggerId::from('a'), "Social contact", 100, wall(0.1)).unwrap();
        let closed = timeline.close_all(1000, wall(1.0), 33);
        assert_eq!(closed, vec![EventIndex(0), EventIndex(1)]);
        assert_eq!(timeline.get(EventIndex(0)).map(|e| e.onset), Some(100));
        assert_eq!(timeline.open_count(), 0);
    }

    #[test]
    fn test_anchor_and_clear() {
        let mut timeline = Timeline::new();
        timeline.insert_anchor(500);
        timeline.insert_anchor(9000);
        assert_eq!(timeline.latest_anchor(), Some(9000));
        timeline.start(TriggerId::from('o'), "Attack bites", 9100, wall(1.0)).unwrap();
        timeline.clear();
        assert!(timeline.is_empty());
        assert_eq!(timeline.latest_anchor(), None);
        assert_eq!(timeline.drain_events().last(), Some(&DomainEvent::TimelineCleared));
    }

    #[test]
    fn test_events_with_active() {
        let mut timeline = Timeline::new();
        timeline.insert_anchor(0);
        timeline.start(TriggerId::from('o'), "Attack bites", 400, wall(0.4)).unwrap();
        let events = timeline.events_with_active(1200);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].offset, Some(1200));
        // the store itself is unchanged
        assert_eq!(timeline.open_count(), 1);
    }

    #[test]
    fn test_behavior_statistics() {
        let timeline = Timeline::from_events(vec![
            BehaviorEvent::anchor(0),
            BehaviorEvent::closed(TriggerId::from('o'), "Attack bites", 0, 1000),
            BehaviorEvent::closed(TriggerId::from('o'), "Attack bites", 2000, 5000),
            BehaviorEvent::closed(TriggerId::from('q'), "Chasing", 100, 600),
        ]);
        let stats = timeline.behavior_statistics();
        assert_eq!(stats.len(), 2);
        let bites = stats["Attack bites"];
        assert_eq!(bites.count, 2);
        assert!((bites.total_secs - 4.0).abs() < 1e-9);
        assert!((bites.mean_secs - 2.0).abs() < 1e-9);
    }
}
