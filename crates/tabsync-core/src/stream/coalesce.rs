//! Per-issue coalescing of events within one debounce window.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::issue::model::{BatchedUpdateNotification, IssueEventType, PendingIssueEvent};

/// Pending events keyed by issue id, last write wins.
#[derive(Debug, Default)]
pub struct Coalescer {
    events: Vec<PendingIssueEvent>,
    positions: HashMap<String, usize>,
    seen: BTreeSet<IssueEventType>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an event, replacing any earlier one for the same issue.
    pub fn push(&mut self, event: PendingIssueEvent) {
        self.seen.insert(event.event_type);
        match self.positions.get(event.issue_id()) {
            Some(&i) => self.events[i] = event,
            None => {
                self.positions
                    .insert(event.issue_id().to_string(), self.events.len());
                self.events.push(event);
            }
        }
    }

    /// Drain everything into one batch. `None` if nothing is pending.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<BatchedUpdateNotification> {
        if self.events.is_empty() {
            return None;
        }
        self.positions.clear();
        let events = std::mem::take(&mut self.events);
        let issue_ids = events.iter().map(|e| e.issue.id.clone()).collect();

        Some(BatchedUpdateNotification {
            issue_ids,
            events,
            event_types: std::mem::take(&mut self.seen),
            timestamp: now,
        })
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.positions.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
