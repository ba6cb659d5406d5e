//! Command execution on dedicated threads
//!
//! The runner is the failure firewall between commands and the scheduler:
//! errors and panics raised by `execute()` are caught here, reported to the
//! observer, and never propagate further. Running-set membership is released
//! by a drop guard, so it is returned even when the observer itself panics
//! or the thread never starts.

use crate::command::Command;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a command execution failed
#[derive(Debug)]
pub enum ExecutionFailure {
    /// `execute()` returned an error
    Error(anyhow::Error),
    /// `execute()` panicked
    Panicked(String),
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{:#}", err),
            Self::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// Observability hook for command executions
///
/// Called from runner threads. Implementations must be cheap; a slow
/// observer keeps the command in the running set for longer.
pub trait ExecutionObserver<C>: Send + Sync + 'static {
    /// Execution is about to begin
    fn on_start(&self, _command: &C) {}

    /// Execution returned `Ok`
    fn on_success(&self, _command: &C, _elapsed: Duration) {}

    /// Execution returned an error or panicked
    fn on_failure(&self, command: &C, failure: &ExecutionFailure, elapsed: Duration);
}

/// Default observer: reports executions through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl<C: Command> ExecutionObserver<C> for TracingObserver {
    fn on_start(&self, command: &C) {
        debug!("Executing {:?}", command);
    }

    fn on_success(&self, command: &C, elapsed: Duration) {
        debug!("Executed {:?} in {:?}", command, elapsed);
    }

    fn on_failure(&self, command: &C, failure: &ExecutionFailure, elapsed: Duration) {
        warn!("Command {:?} failed after {:?}: {}", command, elapsed, failure);
    }
}

/// Starts each command on its own thread
///
/// There is no pool and no cap: every dispatch creates a thread. A burst of
/// distinct due commands therefore fans out without bound, and a command
/// that never returns holds its thread forever.
pub struct CommandRunner<C> {
    thread_name: String,
    observer: Arc<dyn ExecutionObserver<C>>,
}

impl<C: Command> CommandRunner<C> {
    /// Create a runner naming its threads `thread_name`
    pub fn new(thread_name: impl Into<String>, observer: Arc<dyn ExecutionObserver<C>>) -> Self {
        Self {
            thread_name: thread_name.into(),
            observer,
        }
    }

    /// Execute `command` on a new thread
    ///
    /// `on_complete` runs exactly once after execution finishes, whatever
    /// the outcome. If the thread cannot be created it runs before this
    /// returns the spawn error.
    pub fn run<F>(&self, command: Arc<C>, on_complete: F) -> io::Result<()>
    where
        F: FnOnce(&C) + Send + 'static,
    {
        let guard = CompletionGuard {
            command,
            on_complete: Some(on_complete),
        };
        let observer = Arc::clone(&self.observer);

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                let guard = guard;
                execute_observed(&*guard.command, observer.as_ref());
            })?;

        Ok(())
    }
}

/// Run one command, converting errors and panics into observer calls
pub(crate) fn execute_observed<C: Command>(command: &C, observer: &dyn ExecutionObserver<C>) {
    observer.on_start(command);
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| command.execute()));
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(())) => observer.on_success(command, elapsed),
        Ok(Err(err)) => observer.on_failure(command, &ExecutionFailure::Error(err), elapsed),
        Err(payload) => {
            let failure = ExecutionFailure::Panicked(panic_message(payload.as_ref()));
            observer.on_failure(command, &failure, elapsed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Invokes the completion callback when dropped
struct CompletionGuard<C, F: FnOnce(&C)> {
    command: Arc<C>,
    on_complete: Option<F>,
}

impl<C, F: FnOnce(&C)> Drop for CompletionGuard<C, F> {
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(&self.command);
        }
    }
}

/// Commands currently executing, with instance counts
///
/// Counts are only above one for `RunDuplicate` dispatches.
pub(crate) struct RunningSet<C> {
    instances: HashMap<Arc<C>, usize>,
}

impl<C: Command> RunningSet<C> {
    pub(crate) fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Record one more running instance
    pub(crate) fn acquire(&mut self, command: Arc<C>) {
        *self.instances.entry(command).or_insert(0) += 1;
    }

    /// Forget one running instance; `false` if none was recorded
    pub(crate) fn release(&mut self, command: &C) -> bool {
        match self.instances.get_mut(command) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.instances.remove(command);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, command: &C) -> bool {
        self.instances.contains_key(command)
    }

    pub(crate) fn instances_of(&self, command: &C) -> usize {
        self.instances.get(command).copied().unwrap_or(0)
    }

    /// Number of distinct identities running
    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }
}
