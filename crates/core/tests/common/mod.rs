//! Common utilities for scheduler integration tests

use parking_lot::{Condvar, Mutex};
use reactor_core::{Command, ExecutionFailure, ExecutionObserver, MergeableCommand};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Route scheduler logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared record of what ran, when, and how concurrently
#[derive(Default)]
pub struct Journal {
    runs: Mutex<Vec<(String, BTreeSet<u32>, Instant)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Payloads executed for `key`, in start order
    pub fn runs_of(&self, key: &str) -> Vec<BTreeSet<u32>> {
        self.runs
            .lock()
            .iter()
            .filter(|(k, _, _)| k == key)
            .map(|(_, items, _)| items.clone())
            .collect()
    }

    /// Start time of the first run of `key`
    pub fn first_start(&self, key: &str) -> Option<Instant> {
        self.runs
            .lock()
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, _, at)| *at)
    }

    /// Highest number of probes seen executing at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Poll until `key` has run `count` times or `timeout` passes
    pub async fn wait_for_runs(&self, key: &str, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.runs_of(key).len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.runs_of(key).len() >= count
    }
}

/// Blocks executions until opened
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

/// Test command: identity is `key`, payload is `items`
#[derive(Clone)]
pub struct Probe {
    pub key: String,
    pub items: BTreeSet<u32>,
    pub mergeable: bool,
    pub fail: bool,
    journal: Arc<Journal>,
    gate: Option<Arc<Gate>>,
}

impl Probe {
    pub fn new(journal: &Arc<Journal>, key: &str, item: u32) -> Self {
        Self {
            key: key.to_string(),
            items: BTreeSet::from([item]),
            mergeable: true,
            fail: false,
            journal: Arc::clone(journal),
            gate: None,
        }
    }

    /// Block execution until `gate` opens
    pub fn gated(mut self, gate: &Arc<Gate>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn plain(mut self) -> Self {
        self.mergeable = false;
        self
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Probe({} {:?})", self.key, self.items)
    }
}

impl PartialEq for Probe {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Probe {}

impl Hash for Probe {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Command for Probe {
    fn execute(&self) -> anyhow::Result<()> {
        let active = self.journal.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.max_active.fetch_max(active, Ordering::SeqCst);
        self.journal
            .runs
            .lock()
            .push((self.key.clone(), self.items.clone(), Instant::now()));

        if let Some(gate) = &self.gate {
            gate.wait();
        }
        self.journal.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            anyhow::bail!("probe {} failed", self.key);
        }
        Ok(())
    }

    fn as_mergeable(&self) -> Option<&dyn MergeableCommand<Self>> {
        if self.mergeable {
            Some(self)
        } else {
            None
        }
    }
}

impl MergeableCommand<Probe> for Probe {
    fn merge(&self, incoming: Probe) -> Probe {
        let mut merged = incoming;
        merged.items.extend(self.items.iter().copied());
        merged
    }
}

/// Observer collecting failure messages
#[derive(Default)]
pub struct FailureLog {
    pub failures: Mutex<Vec<String>>,
}

impl ExecutionObserver<Probe> for FailureLog {
    fn on_failure(&self, command: &Probe, failure: &ExecutionFailure, _elapsed: Duration) {
        self.failures.lock().push(format!("{}: {}", command.key, failure));
    }
}
