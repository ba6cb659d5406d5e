//! Change-event intake for Reactor
//!
//! This crate sits between whatever detects changes (inotify, FSEvents,
//! a class-redefinition hook) and the scheduler:
//! - Event filtering (VCS directories, editor temp files, custom patterns)
//! - Per-path event coalescing
//! - Batched or per-path debouncing through `reactor_core::Scheduler`
//! - Forwarding of redefinition signals as external events

pub mod coalesce;
pub mod debounce;
pub mod event;
pub mod ignore;

// Re-exports
pub use crate::ignore::{IgnoreConfig, IgnoreRules};
pub use coalesce::{ChangeSet, ChangeSetCommand, Reaction};
pub use debounce::{DebounceConfig, DebounceMode, EventDebouncer};
pub use event::{EventKind, WatchEvent};

/// Result type for watcher operations
pub type Result<T> = anyhow::Result<T>;
