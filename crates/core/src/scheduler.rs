//! Debounced, mergeable, at-most-one-concurrent-per-identity scheduler
//!
//! Producers submit commands with a delay and a duplicate policy. Equal
//! submissions collapse into one pending entry whose deadline slides
//! forward on every submission; mergeable commands additionally combine
//! their payloads. A background sweep (every tick) and `on_external_event()`
//! run dispatch passes that hand due commands to the runner, resolving
//! conflicts with already-running equal commands per policy.
//!
//! Lifecycle: `Created -> Running -> Stopped`, no way back.

use crate::command::Command;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::policy::{DuplicatePolicy, ScheduleEntry};
use crate::runner::{CommandRunner, ExecutionObserver, RunningSet, TracingObserver};
use crate::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Scheduler lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Built, sweep loop not started
    Created,
    /// Sweep loop active
    Running,
    /// Stopped for good; submissions and passes are ignored
    Stopped,
}

/// Outcome of one dispatch pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Commands handed to the runner
    pub dispatched: usize,
    /// Due commands dropped because an equal command was running (`Skip`)
    pub skipped: usize,
    /// Due commands left pending behind a running equal command
    pub deferred: usize,
}

impl DispatchSummary {
    /// True when the pass touched nothing
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0 && self.skipped == 0 && self.deferred == 0
    }
}

/// Command scheduler
///
/// A cheap, cloneable handle: every clone drives the same pending and
/// running sets. The sweep loop only holds a weak reference and ends once
/// all handles are dropped.
pub struct Scheduler<C: Command> {
    shared: Arc<Shared<C>>,
}

impl<C: Command> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Command> Default for Scheduler<C> {
    fn default() -> Self {
        Self::from_parts(SchedulerConfig::default(), Arc::new(TracingObserver))
    }
}

impl<C: Command> Scheduler<C> {
    /// Create a scheduler that reports executions through `tracing`
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a scheduler reporting executions to `observer`
    pub fn with_observer(
        config: SchedulerConfig,
        observer: Arc<dyn ExecutionObserver<C>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(config, observer))
    }

    fn from_parts(config: SchedulerConfig, observer: Arc<dyn ExecutionObserver<C>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let runner = CommandRunner::new(config.runner_thread_name.clone(), observer);

        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables {
                    pending: HashMap::new(),
                    running: RunningSet::new(),
                    state: SchedulerState::Created,
                    fault: None,
                }),
                config,
                runner,
                shutdown,
            }),
        }
    }

    /// Schedule with the default delay and `WaitThenRunAfter`
    pub fn schedule(&self, command: C) {
        let delay = self.shared.config.default_delay();
        self.schedule_with_policy(command, delay, DuplicatePolicy::default());
    }

    /// Schedule `delay` from now with `WaitThenRunAfter`
    pub fn schedule_with_delay(&self, command: C, delay: Duration) {
        self.schedule_with_policy(command, delay, DuplicatePolicy::default());
    }

    /// Schedule `delay` from now, resolving running duplicates with `policy`
    ///
    /// An equal pending command is merged (when mergeable) or replaced, and
    /// its deadline restarts from now.
    pub fn schedule_with_policy(&self, command: C, delay: Duration, policy: DuplicatePolicy) {
        self.shared.upsert(Instant::now(), command, delay, policy, false);
    }

    /// Schedule with `WaitThenRunAfter`, also firing on the next external event
    pub fn schedule_on_event_or_timeout(&self, command: C, delay: Duration) {
        self.schedule_on_event_or_timeout_with_policy(command, delay, DuplicatePolicy::default());
    }

    /// Schedule to fire after `delay` or on the next external event
    ///
    /// The early fire only happens when `external_event_firing` is enabled;
    /// otherwise the entry behaves like a plain timed one.
    pub fn schedule_on_event_or_timeout_with_policy(
        &self,
        command: C,
        delay: Duration,
        policy: DuplicatePolicy,
    ) {
        self.shared.upsert(Instant::now(), command, delay, policy, true);
    }

    /// Start the background sweep loop
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// running is a no-op; calling it after `stop()` fails.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(SchedulerError::NoRuntime)?;

        {
            let mut tables = self.shared.tables.lock();
            match tables.state {
                SchedulerState::Running => {
                    debug!("Scheduler already running");
                    return Ok(());
                }
                SchedulerState::Stopped => return Err(SchedulerError::Stopped),
                SchedulerState::Created => tables.state = SchedulerState::Running,
            }
        }

        let tick = self.shared.config.tick_interval();
        let shutdown = self.shared.shutdown.subscribe();
        info!("Starting scheduler sweep (tick: {:?})", tick);

        handle.spawn(sweep_loop(Arc::downgrade(&self.shared), tick, shutdown));
        Ok(())
    }

    /// Stop the sweep loop after its current iteration
    ///
    /// In-flight executions are not cancelled. Pending commands are
    /// discarded, and later submissions are ignored.
    pub fn stop(&self) {
        let discarded = {
            let mut tables = self.shared.tables.lock();
            if tables.state == SchedulerState::Stopped {
                return;
            }
            tables.state = SchedulerState::Stopped;
            let discarded = tables.pending.len();
            tables.pending.clear();
            discarded
        };

        self.shared.shutdown.send_replace(true);
        info!("Scheduler stopped ({} pending commands discarded)", discarded);
    }

    /// Run one dispatch pass on the caller's thread, forcing flagged entries
    ///
    /// Blocks for the pass only; executions run asynchronously.
    pub fn on_external_event(&self) -> Result<DispatchSummary> {
        self.shared.dispatch_pass(Instant::now(), true)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        self.shared.tables.lock().state
    }

    /// Number of pending commands
    pub fn pending_len(&self) -> usize {
        self.shared.tables.lock().pending.len()
    }

    /// Number of distinct commands currently executing
    pub fn running_len(&self) -> usize {
        self.shared.tables.lock().running.len()
    }

    /// Whether an equal command is waiting to be dispatched
    pub fn is_pending(&self, command: &C) -> bool {
        self.shared.tables.lock().pending.contains_key(command)
    }

    /// Whether an equal command is executing
    pub fn is_running(&self, command: &C) -> bool {
        self.shared.tables.lock().running.contains(command)
    }

    /// Number of concurrent executions of commands equal to `command`
    pub fn running_instances(&self, command: &C) -> usize {
        self.shared.tables.lock().running.instances_of(command)
    }

    /// Configuration this scheduler was built with
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }
}

/// State shared between handles, the sweep loop and runner callbacks
struct Shared<C: Command> {
    /// Pending and running sets behind one lock
    tables: Mutex<Tables<C>>,
    config: SchedulerConfig,
    runner: CommandRunner<C>,
    shutdown: watch::Sender<bool>,
}

struct Tables<C: Command> {
    pending: HashMap<Arc<C>, ScheduleEntry>,
    running: RunningSet<C>,
    state: SchedulerState,
    /// First command whose completion found no running membership
    fault: Option<String>,
}

impl<C: Command> Shared<C> {
    /// Insert or merge `command` into the pending set
    fn upsert(
        &self,
        now: Instant,
        command: C,
        delay: Duration,
        policy: DuplicatePolicy,
        fire_on_external_event: bool,
    ) {
        let entry = ScheduleEntry::new(now, delay, policy, fire_on_external_event);
        let mut tables = self.tables.lock();

        if tables.state == SchedulerState::Stopped {
            debug!("Ignoring {:?}: scheduler stopped", command);
            return;
        }

        // The key is replaced rather than kept so the latest payload wins
        let key = match tables.pending.remove_entry(&command) {
            Some((existing, _)) if command.as_mergeable().is_some() => {
                match existing.as_mergeable() {
                    Some(mergeable) => {
                        let merged = mergeable.merge(command);
                        debug_assert!(merged == *existing, "merge changed command identity");
                        debug!("Merged {:?} into pending command", merged);
                        merged
                    }
                    None => command,
                }
            }
            Some(_) => {
                debug!("Replacing pending {:?}", command);
                command
            }
            None => command,
        };

        tables.pending.insert(Arc::new(key), entry);
    }

    /// Dispatch every entry that is due at `now` (or forced by the event)
    fn dispatch_pass(self: &Arc<Self>, now: Instant, external_event: bool) -> Result<DispatchSummary> {
        let mut summary = DispatchSummary::default();
        let force = external_event && self.config.external_event_firing;

        let ready = {
            let mut tables = self.tables.lock();

            if tables.state == SchedulerState::Stopped {
                return Ok(summary);
            }
            if let Some(command) = &tables.fault {
                return Err(SchedulerError::RunningSetCorrupted {
                    command: command.clone(),
                });
            }

            let Tables { pending, running, .. } = &mut *tables;
            let mut ready = Vec::new();

            pending.retain(|command, entry| {
                if !entry.should_fire(now, force) {
                    return true;
                }
                if !running.contains(command) {
                    ready.push((Arc::clone(command), *entry));
                    return false;
                }

                match entry.on_duplicate {
                    DuplicatePolicy::Skip => {
                        debug!("Skipping {:?}: already running", command);
                        summary.skipped += 1;
                        false
                    }
                    DuplicatePolicy::RunDuplicate => {
                        debug!("Running duplicate of {:?}", command);
                        ready.push((Arc::clone(command), *entry));
                        false
                    }
                    DuplicatePolicy::WaitThenRunAfter => {
                        summary.deferred += 1;
                        true
                    }
                }
            });

            // Membership is recorded before the lock is released
            for (command, _) in &ready {
                running.acquire(Arc::clone(command));
            }
            ready
        };

        summary.dispatched = ready.len();
        self.launch(ready)?;

        if !summary.is_empty() {
            debug!(
                "Dispatch pass (external_event: {}): {} dispatched, {} skipped, {} deferred",
                external_event, summary.dispatched, summary.skipped, summary.deferred
            );
        }
        Ok(summary)
    }

    /// Start runner threads for already-acquired commands
    fn launch(self: &Arc<Self>, ready: Vec<(Arc<C>, ScheduleEntry)>) -> Result<()> {
        self.launch_with(ready, |command, on_complete| self.runner.run(command, on_complete))
    }

    /// Hand each ready command to `spawn` with its completion callback
    ///
    /// `spawn` must invoke the callback itself when it fails. On a failure
    /// the failed command and every command not yet started go back to the
    /// pending set (unless a newer equal submission arrived meanwhile) and
    /// the error is returned.
    fn launch_with<S>(self: &Arc<Self>, ready: Vec<(Arc<C>, ScheduleEntry)>, mut spawn: S) -> Result<()>
    where
        S: FnMut(Arc<C>, Completion<C>) -> io::Result<()>,
    {
        let mut ready = ready.into_iter();

        while let Some((command, entry)) = ready.next() {
            let shared = Arc::downgrade(self);
            let on_complete: Completion<C> = Box::new(move |command: &C| {
                if let Some(shared) = shared.upgrade() {
                    shared.release(command);
                }
            });

            if let Err(source) = spawn(Arc::clone(&command), on_complete) {
                // The completion callback already released `command`
                let mut tables = self.tables.lock();
                for (rest, _) in ready.as_slice() {
                    tables.running.release(rest);
                }
                for (rest, rest_entry) in std::iter::once((command.clone(), entry)).chain(ready) {
                    tables.pending.entry(rest).or_insert(rest_entry);
                }

                return Err(SchedulerError::Spawn {
                    command: format!("{:?}", command),
                    source,
                });
            }
        }

        Ok(())
    }

    /// Drop one running instance of `command`
    fn release(&self, command: &C) {
        let mut tables = self.tables.lock();
        if !tables.running.release(command) {
            error!("Running set lost track of {:?}", command);
            tables.fault.get_or_insert_with(|| format!("{:?}", command));
        }
    }
}

/// Releases one running instance when invoked
type Completion<C> = Box<dyn FnOnce(&C) + Send>;

async fn sweep_loop<C: Command>(
    shared: Weak<Shared<C>>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut timer = interval(tick);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if *shutdown.borrow() {
            break;
        }

        let Some(shared) = shared.upgrade() else {
            debug!("All scheduler handles dropped");
            break;
        };

        if let Err(e) = shared.dispatch_pass(Instant::now(), false) {
            error!("Scheduler sweep aborted: {}", e);
            break;
        }
    }

    info!("Scheduler sweep loop exited");
}
