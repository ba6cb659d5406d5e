//! Event coalescing
//!
//! Collapses a burst of events into at most one change per path, and wraps
//! the result in a mergeable command so the scheduler can keep folding new
//! bursts into a pending reaction.

use crate::event::{EventKind, WatchEvent};
use reactor_core::{Command, MergeableCommand};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Coalesced changes, one entry per path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<PathBuf, EventKind>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the set
    ///
    /// Rules, earlier kind first:
    /// - create + modify = create
    /// - create + delete = nothing (the file never existed for the reaction)
    /// - delete + create = modify
    /// - anything else: the later kind wins
    pub fn record(&mut self, event: WatchEvent) {
        let previous = self.changes.get(&event.path).copied();

        match (previous, event.kind) {
            (Some(EventKind::Create), EventKind::Modify) => {}
            (Some(EventKind::Create), EventKind::Delete) => {
                self.changes.remove(&event.path);
            }
            (Some(EventKind::Delete), EventKind::Create) => {
                self.changes.insert(event.path, EventKind::Modify);
            }
            (_, kind) => {
                self.changes.insert(event.path, kind);
            }
        }
    }

    /// Fold a later change set into this one
    pub fn absorb(&mut self, later: ChangeSet) {
        for (path, kind) in later.changes {
            self.record(WatchEvent { path, kind });
        }
    }

    /// Coalesced kind for `path`, if any
    pub fn kind_of(&self, path: &Path) -> Option<EventKind> {
        self.changes.get(path).copied()
    }

    /// Changed paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.changes.keys().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, EventKind)> {
        self.changes.iter().map(|(path, kind)| (path.as_path(), *kind))
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<WatchEvent> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = WatchEvent>>(events: I) -> Self {
        let mut set = Self::new();
        for event in events {
            set.record(event);
        }
        set
    }
}

/// Reaction run with the coalesced changes
pub type Reaction = Arc<dyn Fn(&ChangeSet) -> anyhow::Result<()> + Send + Sync>;

/// Scheduler command carrying pending changes for one named reaction
///
/// Identity is the name alone, so every submission for the same reaction
/// merges into a single pending command.
#[derive(Clone)]
pub struct ChangeSetCommand {
    name: String,
    changes: ChangeSet,
    reaction: Reaction,
}

impl ChangeSetCommand {
    pub fn new(name: impl Into<String>, changes: ChangeSet, reaction: Reaction) -> Self {
        Self {
            name: name.into(),
            changes,
            reaction,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }
}

impl fmt::Debug for ChangeSetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeSetCommand({}, {} paths)", self.name, self.changes.len())
    }
}

impl PartialEq for ChangeSetCommand {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChangeSetCommand {}

impl Hash for ChangeSetCommand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Command for ChangeSetCommand {
    fn execute(&self) -> anyhow::Result<()> {
        // Bursts can cancel out entirely (create then delete)
        if self.changes.is_empty() {
            debug!("Nothing left to react to for {}", self.name);
            return Ok(());
        }
        (self.reaction)(&self.changes)
    }

    fn as_mergeable(&self) -> Option<&dyn MergeableCommand<Self>> {
        Some(self)
    }
}

impl MergeableCommand<ChangeSetCommand> for ChangeSetCommand {
    fn merge(&self, incoming: ChangeSetCommand) -> ChangeSetCommand {
        let mut changes = self.changes.clone();
        changes.absorb(incoming.changes);

        ChangeSetCommand {
            name: incoming.name,
            changes,
            reaction: incoming.reaction,
        }
    }
}
