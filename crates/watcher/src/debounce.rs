//! Event debouncing
//!
//! Routes filtered change events into a `Scheduler<ChangeSetCommand>`.
//! Every submission for the same reaction key merges into one pending
//! command whose deadline restarts, so a reaction runs once per quiet
//! period with every change since the burst started.

use crate::coalesce::{ChangeSet, ChangeSetCommand, Reaction};
use crate::event::WatchEvent;
use crate::ignore::IgnoreRules;
use anyhow::Result;
use reactor_core::{DispatchSummary, DuplicatePolicy, Scheduler};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Valid range for `delay_ms`
const DELAY_RANGE_MS: (u64, u64) = (0, 60_000);

/// How events map onto command identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceMode {
    /// One pending command for the whole reaction
    #[default]
    Batched,
    /// One pending command per changed path
    PerPath,
}

/// Debounce configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet period before the reaction runs (default: 300ms)
    pub delay_ms: u64,

    /// Resolution against a reaction that is still running
    pub policy: DuplicatePolicy,

    /// Identity granularity
    pub mode: DebounceMode,

    /// Also fire on redefinition signals (default: false)
    pub fire_on_event: bool,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            delay_ms: 300,
            policy: DuplicatePolicy::default(),
            mode: DebounceMode::default(),
            fire_on_event: false,
        }
    }
}

impl DebounceConfig {
    pub fn validate(&self) -> Result<()> {
        let (min, max) = DELAY_RANGE_MS;
        if self.delay_ms < min || self.delay_ms > max {
            anyhow::bail!(
                "delay_ms must be between {} and {} (got {})",
                min,
                max,
                self.delay_ms
            );
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Feeds change events for one named reaction into the scheduler
pub struct EventDebouncer {
    name: String,
    scheduler: Scheduler<ChangeSetCommand>,
    rules: IgnoreRules,
    config: DebounceConfig,
    reaction: Reaction,
}

impl EventDebouncer {
    /// Create a debouncer submitting to `scheduler`
    pub fn new<F>(
        name: impl Into<String>,
        scheduler: Scheduler<ChangeSetCommand>,
        rules: IgnoreRules,
        config: DebounceConfig,
        reaction: F,
    ) -> Result<Self>
    where
        F: Fn(&ChangeSet) -> Result<()> + Send + Sync + 'static,
    {
        config.validate()?;

        Ok(Self {
            name: name.into(),
            scheduler,
            rules,
            config,
            reaction: Arc::new(reaction),
        })
    }

    /// Submit one event; returns `false` if it was filtered out
    pub fn submit(&self, event: WatchEvent) -> bool {
        self.submit_batch(std::iter::once(event)) == 1
    }

    /// Submit a batch of events; returns how many passed the filters
    pub fn submit_batch(&self, events: impl IntoIterator<Item = WatchEvent>) -> usize {
        let accepted: Vec<WatchEvent> = events
            .into_iter()
            .filter(|event| {
                let ignored = self.rules.should_ignore(&event.path);
                if ignored {
                    trace!("Ignoring event for {}", event.path.display());
                }
                !ignored
            })
            .collect();
        let count = accepted.len();

        match self.config.mode {
            DebounceMode::Batched => {
                if !accepted.is_empty() {
                    self.enqueue(self.name.clone(), accepted.into_iter().collect());
                }
            }
            DebounceMode::PerPath => {
                for event in accepted {
                    let key = self.path_key(&event.path);
                    self.enqueue(key, std::iter::once(event).collect());
                }
            }
        }

        count
    }

    /// Forward an authoritative redefinition signal to the scheduler
    pub fn on_redefinition(&self) -> reactor_core::Result<DispatchSummary> {
        self.scheduler.on_external_event()
    }

    /// Whether a reaction for `path` (per-path) or the whole batch is pending
    pub fn is_pending(&self, path: Option<&Path>) -> bool {
        let key = match path {
            Some(path) => self.path_key(path),
            None => self.name.clone(),
        };
        self.scheduler
            .is_pending(&ChangeSetCommand::new(key, ChangeSet::new(), self.reaction.clone()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &Scheduler<ChangeSetCommand> {
        &self.scheduler
    }

    fn path_key(&self, path: &Path) -> String {
        format!("{}:{}", self.name, path.display())
    }

    fn enqueue(&self, key: String, changes: ChangeSet) {
        debug!("Queueing {} changes for {}", changes.len(), key);
        let command = ChangeSetCommand::new(key, changes, self.reaction.clone());
        let delay = self.config.delay();

        if self.config.fire_on_event {
            self.scheduler
                .schedule_on_event_or_timeout_with_policy(command, delay, self.config.policy);
        } else {
            self.scheduler
                .schedule_with_policy(command, delay, self.config.policy);
        }
    }
}
