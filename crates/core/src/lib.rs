//! Debounced, mergeable command scheduling for Reactor
//!
//! This crate provides the coordination layer between bursty change
//! notifications and the reactions they trigger:
//! - Time debouncing (deadline slides forward on every equal submission)
//! - Identity-based deduplication and payload merging
//! - At-most-one concurrent execution per command identity (policy driven)
//! - Early firing on authoritative external events

pub mod command;
pub mod config;
pub mod error;
pub mod policy;
pub mod runner;
pub mod scheduler;

// Re-export main types for convenience
pub use command::{Command, MergeableCommand};
pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use policy::{DuplicatePolicy, ScheduleEntry};
pub use runner::{CommandRunner, ExecutionFailure, ExecutionObserver, TracingObserver};
pub use scheduler::{DispatchSummary, Scheduler, SchedulerState};

/// Common result type used throughout reactor-core
pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;
