//! Burst-to-reaction flow through a live scheduler

use parking_lot::Mutex;
use reactor_core::{Scheduler, SchedulerConfig};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use watcher::{ChangeSet, DebounceConfig, EventDebouncer, EventKind, IgnoreConfig, IgnoreRules, WatchEvent};

type Seen = Arc<Mutex<Vec<(ChangeSet, Instant)>>>;

fn scheduler() -> Scheduler<watcher::ChangeSetCommand> {
    let config = SchedulerConfig {
        tick_interval_ms: 10,
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::new(config).unwrap();
    scheduler.start().unwrap();
    scheduler
}

async fn wait_for(seen: &Seen, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if seen.lock().len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_editor_save_burst_triggers_one_reaction() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(".reactorignore"), "*.log\n").unwrap();
    let rules = IgnoreRules::load(temp_dir.path(), IgnoreConfig::default()).unwrap();

    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let config = DebounceConfig {
        delay_ms: 80,
        ..DebounceConfig::default()
    };
    let debouncer = EventDebouncer::new("reload", scheduler(), rules, config, move |changes: &ChangeSet| {
        sink.lock().push((changes.clone(), Instant::now()));
        Ok(())
    })
    .unwrap();

    // Typical safe-write sequence from an editor, plus noise
    debouncer.submit(WatchEvent::created("src/.lib.rs.swp"));
    debouncer.submit(WatchEvent::created("src/lib.rs~"));
    debouncer.submit(WatchEvent::deleted("src/lib.rs"));
    debouncer.submit(WatchEvent::created("src/lib.rs"));
    debouncer.submit(WatchEvent::modified("build.log"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let last_submission = Instant::now();
    debouncer.submit(WatchEvent::modified("src/main.rs"));

    assert!(wait_for(&seen, 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let runs = seen.lock().clone();
    assert_eq!(runs.len(), 1);
    let (changes, fired_at) = &runs[0];
    assert_eq!(changes.len(), 2);
    assert_eq!(changes.kind_of(Path::new("src/lib.rs")), Some(EventKind::Modify));
    assert_eq!(changes.kind_of(Path::new("src/main.rs")), Some(EventKind::Modify));
    assert!(fired_at.duration_since(last_submission) >= Duration::from_millis(80));

    debouncer.scheduler().stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changes_during_slow_reaction_run_once_more() {
    let temp_dir = TempDir::new().unwrap();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let release = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&release);

    let config = DebounceConfig {
        delay_ms: 20,
        ..DebounceConfig::default()
    };
    let debouncer = EventDebouncer::new(
        "rebuild",
        scheduler(),
        IgnoreRules::builtin(temp_dir.path()),
        config,
        move |changes: &ChangeSet| {
            sink.lock().push((changes.clone(), Instant::now()));
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        },
    )
    .unwrap();

    debouncer.submit(WatchEvent::modified("a.rs"));
    assert!(wait_for(&seen, 1).await);

    // Arrive while the first reaction is blocked
    debouncer.submit(WatchEvent::modified("b.rs"));
    debouncer.submit(WatchEvent::modified("c.rs"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().len(), 1);

    release.store(true, Ordering::SeqCst);
    assert!(wait_for(&seen, 2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let runs = seen.lock().clone();
    assert_eq!(runs.len(), 2);
    let second: Vec<&Path> = runs[1].0.paths().collect();
    assert_eq!(second, vec![Path::new("b.rs"), Path::new("c.rs")]);

    debouncer.scheduler().stop();
}
