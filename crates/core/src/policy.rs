//! Duplicate-execution policy and per-command schedule metadata

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// What to do when a command becomes due while an equal command is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Drop the pending command; the in-flight run covers it
    Skip,
    /// Start a second, concurrent execution
    RunDuplicate,
    /// Keep the command pending until the running instance finishes
    #[default]
    WaitThenRunAfter,
}

/// Schedule metadata for one pending command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    /// Deadline after which the command is due
    ///
    /// `None` when `now + delay` does not fit in an `Instant`; such an entry
    /// only fires through an external event.
    pub due_at: Option<Instant>,
    /// Conflict resolution against a running equal command
    pub on_duplicate: DuplicatePolicy,
    /// Whether an external event may fire this entry before its deadline
    pub fire_on_external_event: bool,
}

impl ScheduleEntry {
    /// Create an entry due `delay` after `now`
    pub fn new(
        now: Instant,
        delay: Duration,
        on_duplicate: DuplicatePolicy,
        fire_on_external_event: bool,
    ) -> Self {
        Self {
            due_at: now.checked_add(delay),
            on_duplicate,
            fire_on_external_event,
        }
    }

    /// Check whether the deadline has passed
    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at.map_or(false, |due_at| due_at <= now)
    }

    /// Check whether the entry fires in a pass at `now`
    ///
    /// `external_event` must already account for whether the scheduler
    /// honours external events at all.
    pub fn should_fire(&self, now: Instant, external_event: bool) -> bool {
        self.is_due(now) || (external_event && self.fire_on_external_event)
    }
}
