//! Scheduler error types

use thiserror::Error;

/// Errors surfaced by the scheduler itself
///
/// Command execution failures are not represented here: they stay inside
/// the runner and are reported through the `ExecutionObserver`.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start()` was called outside of a tokio runtime
    #[error("Scheduler must be started from within a tokio runtime")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),

    /// `start()` was called after `stop()`
    #[error("Scheduler has been stopped and cannot be restarted")]
    Stopped,

    /// The runner could not create a thread for a due command
    #[error("Failed to spawn runner thread for {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A completed command was missing from the running set
    #[error("Running set lost track of {command}")]
    RunningSetCorrupted { command: String },

    /// Configuration value out of range
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}
