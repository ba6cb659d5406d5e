//! File system change events

use std::path::{Path, PathBuf};

/// A change already detected by the host's watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: EventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn created(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), EventKind::Create)
    }

    pub fn modified(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), EventKind::Modify)
    }

    pub fn deleted(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), EventKind::Delete)
    }
}

/// Type of file system event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// File created
    Create,
    /// File modified
    Modify,
    /// File deleted
    Delete,
    /// File renamed
    Rename,
}
