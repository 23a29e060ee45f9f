//! Dispatcher behaviour against a real spool directory.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::handlers::{Action, HandlerError, HandlerRegistry, Invocation};
use crate::spool::{Spool, SpoolEntry};
use crate::test_utils::RecordingAction;
use crate::types::{HookName, Source};

fn spool_in(dir: &TempDir) -> Spool {
    Spool::new(dir.path().join("spool"))
}

fn enqueue_at(spool: &Spool, hook: &str, secs: u32, suffix: &str) -> SpoolEntry {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, secs).unwrap();
    spool
        .enqueue_with(
            &HookName::parse(hook).unwrap(),
            &Source::GitHub,
            format!("{{\"n\":{secs}}}").as_bytes(),
            now,
            &mut || suffix.to_string(),
        )
        .unwrap()
}

fn dispatcher(spool: &Spool, registry: HandlerRegistry) -> Dispatcher {
    Dispatcher::new(spool.clone(), registry, DispatcherConfig::default())
}

#[tokio::test]
async fn handled_entry_is_invoked_once_and_released() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    spool
        .enqueue("codenames", &Source::GitHub, br#"{"ref":"refs/heads/main"}"#)
        .unwrap();

    let mut dispatcher = dispatcher(&spool, registry);
    let report = dispatcher.drain_all(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.handled, 1);
    assert_eq!(action.call_count(), 1);
    let call = &action.calls()[0];
    assert_eq!(call.hook.as_str(), "codenames");
    assert_eq!(call.payload, br#"{"ref":"refs/heads/main"}"#);
    assert_eq!(spool.count_pending().unwrap(), 0);
    assert_eq!(dispatcher.state(), DispatcherState::Idle);
}

#[tokio::test]
async fn failed_action_still_releases_entry() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::failing("apps", 2);
    let registry = HandlerRegistry::new().exact("apps", action.clone()).unwrap();

    enqueue_at(&spool, "apps", 0, "aaaaaaa");

    let report = dispatcher(&spool, registry)
        .drain_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.handled, 0);
    assert_eq!(action.call_count(), 1);
    assert_eq!(spool.count_pending().unwrap(), 0);
}

#[tokio::test]
async fn unmatched_hook_is_discarded_without_invocation() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    enqueue_at(&spool, "nobody-home", 0, "aaaaaaa");

    let report = dispatcher(&spool, registry)
        .drain_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.unmatched, 1);
    assert_eq!(action.call_count(), 0);
    assert_eq!(spool.count_pending().unwrap(), 0);
}

#[tokio::test]
async fn entries_are_handled_in_arrival_order() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("all");
    let registry = HandlerRegistry::new()
        .exact("zeta", action.clone())
        .unwrap()
        .exact("alpha", action.clone())
        .unwrap()
        .exact("mid", action.clone())
        .unwrap();

    enqueue_at(&spool, "zeta", 1, "aaaaaaa");
    enqueue_at(&spool, "alpha", 3, "aaaaaaa");
    enqueue_at(&spool, "mid", 2, "aaaaaaa");

    dispatcher(&spool, registry)
        .drain_all(&CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<String> = action
        .calls()
        .iter()
        .map(|c| c.hook.as_str().to_string())
        .collect();
    assert_eq!(order, vec!["zeta", "mid", "alpha"]);
}

/// Enqueues a follow-up entry the first time it runs.
struct Chaining {
    spool: Spool,
    calls: std::sync::Mutex<Vec<String>>,
}

impl Action for Chaining {
    fn name(&self) -> &str {
        "chaining"
    }

    fn invoke(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        let mut calls = self.calls.lock().unwrap();
        if calls.is_empty() {
            self.spool
                .enqueue("second", &Source::GitHub, b"{}")
                .unwrap();
        }
        calls.push(invocation.hook.as_str().to_string());
        Ok(())
    }
}

#[tokio::test]
async fn entries_arriving_mid_drain_are_handled_in_same_drain() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = Arc::new(Chaining {
        spool: spool.clone(),
        calls: std::sync::Mutex::new(Vec::new()),
    });
    let registry = HandlerRegistry::new()
        .exact("first", action.clone())
        .unwrap()
        .exact("second", action.clone())
        .unwrap();

    enqueue_at(&spool, "first", 0, "aaaaaaa");

    let report = dispatcher(&spool, registry)
        .drain_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.handled, 2);
    assert_eq!(*action.calls.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(spool.count_pending().unwrap(), 0);
}

#[tokio::test]
async fn second_drain_finds_nothing() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    enqueue_at(&spool, "codenames", 0, "aaaaaaa");

    let mut dispatcher = dispatcher(&spool, registry);
    let token = CancellationToken::new();
    dispatcher.drain_all(&token).await.unwrap();
    let report = dispatcher.drain_all(&token).await.unwrap();

    assert_eq!(report, DrainReport::default());
    assert_eq!(action.call_count(), 1);
}

#[tokio::test]
async fn cancelled_drain_leaves_entries_pending() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    enqueue_at(&spool, "codenames", 0, "aaaaaaa");
    enqueue_at(&spool, "codenames", 1, "bbbbbbb");

    let token = CancellationToken::new();
    token.cancel();
    let report = dispatcher(&spool, registry).drain_all(&token).await.unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(action.call_count(), 0);
    assert_eq!(spool.count_pending().unwrap(), 2);
}

/// Sets unix permission bits on `path`.
#[cfg(unix)]
fn set_mode(path: &std::path::Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_entry_is_left_pending_for_next_run() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    let entry = enqueue_at(&spool, "codenames", 0, "aaaaaaa");
    set_mode(&entry.path, 0o000);
    if std::fs::read(&entry.path).is_ok() {
        // Permission bits do not bind this user (root).
        set_mode(&entry.path, 0o644);
        return;
    }

    let token = CancellationToken::new();
    let mut first_run = dispatcher(&spool, registry.clone());
    let report = first_run.drain_all(&token).await.unwrap();
    assert_eq!(report.unreadable, 1);
    assert_eq!(action.call_count(), 0);
    assert!(entry.path.exists());

    // Not retried within the same run.
    let report = first_run.drain_all(&token).await.unwrap();
    assert_eq!(report, DrainReport::default());
    assert!(entry.path.exists());

    set_mode(&entry.path, 0o644);
    let report = dispatcher(&spool, registry).drain_all(&token).await.unwrap();
    assert_eq!(report.handled, 1);
    assert_eq!(action.call_count(), 1);
    assert_eq!(action.calls()[0].payload, br#"{"n":0}"#);
    assert_eq!(spool.count_pending().unwrap(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn failed_release_does_not_rerun_action_in_same_run() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    let entry = enqueue_at(&spool, "codenames", 0, "aaaaaaa");
    set_mode(spool.dir(), 0o555);
    if std::fs::write(spool.dir().join("writable"), b"").is_ok() {
        // Permission bits do not bind this user (root).
        set_mode(spool.dir(), 0o755);
        return;
    }

    let mut dispatcher = dispatcher(&spool, registry);
    let token = CancellationToken::new();
    let first = dispatcher.drain_all(&token).await.unwrap();
    let second = dispatcher.drain_all(&token).await.unwrap();

    set_mode(spool.dir(), 0o755);

    assert_eq!(first.handled, 1);
    assert_eq!(second, DrainReport::default());
    assert_eq!(action.call_count(), 1);
    assert!(entry.path.exists());
    assert_eq!(spool.count_pending().unwrap(), 1);
}

#[tokio::test]
async fn run_survives_zero_poll_interval_set_directly() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    enqueue_at(&spool, "codenames", 0, "aaaaaaa");

    let config = DispatcherConfig {
        poll_interval: Duration::ZERO,
        ..DispatcherConfig::default()
    };
    let token = CancellationToken::new();
    let handle = tokio::spawn(Dispatcher::new(spool.clone(), registry, config).run(token.clone()));

    wait_for(|| action.call_count() == 1).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn run_handles_backlog_and_later_arrivals_then_stops() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    let action = RecordingAction::new("codenames");
    let registry = HandlerRegistry::new().exact("codenames", action.clone()).unwrap();

    // Left over from a previous run.
    enqueue_at(&spool, "codenames", 0, "aaaaaaa");

    let config = DispatcherConfig::default().with_poll_interval(Duration::from_millis(50));
    let token = CancellationToken::new();
    let handle = tokio::spawn(Dispatcher::new(spool.clone(), registry, config).run(token.clone()));

    wait_for(|| action.call_count() == 1).await;

    spool
        .enqueue("codenames", &Source::GitHub, b"{}")
        .unwrap();
    wait_for(|| action.call_count() == 2).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("dispatcher did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(spool.count_pending().unwrap(), 0);
}

#[tokio::test]
async fn run_sweeps_stale_temp_files_at_startup() {
    let dir = tempdir().unwrap();
    let spool = spool_in(&dir);
    std::fs::create_dir_all(spool.dir()).unwrap();
    std::fs::write(spool.dir().join(".tmp-codenames-crashed"), b"partial").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let config = DispatcherConfig::default()
        .with_poll_interval(Duration::from_millis(50))
        .with_stale_temp_age(Duration::ZERO);
    let token = CancellationToken::new();
    let handle = tokio::spawn(Dispatcher::new(spool.clone(), HandlerRegistry::new(), config).run(token.clone()));

    let temp = spool.dir().join(".tmp-codenames-crashed");
    wait_for(|| !temp.exists()).await;

    token.cancel();
    handle.await.unwrap().unwrap();
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
