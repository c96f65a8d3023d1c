//! Run timeline
//!
//! Ordered list of [`UpdateEvent`]s with in-place replacement. An event
//! with `overwrite = true` whose id is already present replaces that row
//! and keeps its position; every other event appends.

use crate::event::{StageStatus, UpdateEvent};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// How an event was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Added as a new row at this position
    Appended(usize),
    /// Replaced the row at this position
    Replaced(usize),
}

/// Ordered, append-or-overwrite event list
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Vec<UpdateEvent>,
    /// Latest row position per id
    index: HashMap<String, usize>,
}

impl Timeline {
    /// Empty timeline
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an event
    pub fn apply(&mut self, event: UpdateEvent) -> Applied {
        if event.overwrite {
            if let Some(&pos) = self.index.get(&event.id) {
                self.events[pos] = event;
                return Applied::Replaced(pos);
            }
        }
        let pos = self.events.len();
        self.index.insert(event.id.clone(), pos);
        self.events.push(event);
        Applied::Appended(pos)
    }

    /// Rows in order
    #[inline]
    #[must_use]
    pub fn events(&self) -> &[UpdateEvent] {
        &self.events
    }

    /// Latest row with this id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&UpdateEvent> {
        self.index.get(id).map(|&pos| &self.events[pos])
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether there are no rows
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Rows with the given status
    pub fn with_status(&self, status: StageStatus) -> impl Iterator<Item = &UpdateEvent> {
        self.events.iter().filter(move |e| e.status == status)
    }

    /// Consume into rows
    #[must_use]
    pub fn into_events(self) -> Vec<UpdateEvent> {
        self.events
    }
}

impl FromIterator<UpdateEvent> for Timeline {
    fn from_iter<I: IntoIterator<Item = UpdateEvent>>(iter: I) -> Self {
        let mut timeline = Self::new();
        for event in iter {
            timeline.apply(event);
        }
        timeline
    }
}

impl Serialize for Timeline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.events.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PipelineStage;
    use pretty_assertions::assert_eq;

    fn event(id: &str, status: StageStatus, message: &str) -> UpdateEvent {
        UpdateEvent::new(id, PipelineStage::Step, status, "Search").with_message(message)
    }

    #[test]
    fn overwrite_keeps_original_position() {
        let mut timeline = Timeline::new();
        timeline.apply(event("plan", StageStatus::Running, "planning"));
        timeline.apply(event("search-0", StageStatus::Running, "searching"));
        let applied = timeline.apply(event("plan", StageStatus::Completed, "done").overwriting());

        assert_eq!(applied, Applied::Replaced(0));
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.events()[0].message, "done");
        assert_eq!(timeline.events()[0].status, StageStatus::Completed);
        assert_eq!(timeline.events()[1].id, "search-0");
    }

    #[test]
    fn same_id_without_overwrite_appends() {
        let mut timeline = Timeline::new();
        timeline.apply(event("progress", StageStatus::Running, "1/3"));
        let applied = timeline.apply(event("progress", StageStatus::Running, "2/3"));

        assert_eq!(applied, Applied::Appended(1));
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.get("progress").map(|e| e.message.as_str()), Some("2/3"));
    }

    #[test]
    fn overwrite_of_unknown_id_appends() {
        let mut timeline = Timeline::new();
        let applied = timeline.apply(event("gap", StageStatus::Completed, "x").overwriting());
        assert_eq!(applied, Applied::Appended(0));
    }

    #[test]
    fn status_filter() {
        let timeline: Timeline = [
            event("a", StageStatus::Completed, ""),
            event("b", StageStatus::Failed, ""),
            event("c", StageStatus::Completed, ""),
        ]
        .into_iter()
        .collect();
        assert_eq!(timeline.with_status(StageStatus::Completed).count(), 2);
    }
}
