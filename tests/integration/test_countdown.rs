//! End-to-end tests for the lockout countdown.
//!
//! The lockout is written by one policy (with a clock pinned in the past when
//! a short or elapsed lockout is needed) and counted down by another over the
//! same state file, as happens when the binary is restarted mid-lockout.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, SubsecRound, Utc};
use invite_guard_core::{
    CountdownBroadcaster, CountdownEvent, CountdownOutcome, CountdownTask, CountdownTimer,
    FileStore, LockoutPolicy, LockoutState, ManualClock, RemainingDuration,
    LOCKOUT_DURATION_SECS,
};
use tokio::time::timeout;

fn scratch_store(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "invite_guard_it_{name}_{}",
        std::process::id()
    ));
    std::fs::remove_dir_all(&dir).ok();
    dir.join("lockout.json")
}

/// Locks entry so that the lockout ends `ends_in` from now.
fn lock_ending_in(store_path: &Path, ends_in: Duration) {
    let started = Utc::now().trunc_subsecs(3) - Duration::seconds(LOCKOUT_DURATION_SECS) + ends_in;
    let policy = LockoutPolicy::with_clock(
        Arc::new(FileStore::new(store_path)),
        Arc::new(ManualClock::new(started)),
    );
    policy.enter_lockout();
}

fn counting_timer(store_path: &Path) -> (CountdownTimer, Arc<AtomicUsize>) {
    let redirects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&redirects);
    let policy = LockoutPolicy::new(Arc::new(FileStore::new(store_path)));
    let timer = CountdownTimer::new(
        policy,
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    (timer, redirects)
}

/// A lockout that ended while nobody was watching is released on mount.
#[tokio::test]
async fn test_elapsed_lockout_expires_on_mount() {
    let store_path = scratch_store("elapsed");
    lock_ending_in(&store_path, Duration::milliseconds(-5000));

    let (timer, redirects) = counting_timer(&store_path);
    let broadcaster = CountdownBroadcaster::default();
    let mut events = broadcaster.subscribe();
    let task = CountdownTask::spawn(timer, StdDuration::from_millis(50), broadcaster);

    let first = timeout(StdDuration::from_secs(2), events.recv())
        .await
        .expect("No event before timeout")
        .expect("Channel closed");
    assert_eq!(first, CountdownEvent::Expired);

    assert_eq!(task.join().await, CountdownOutcome::Expired);
    assert_eq!(redirects.load(Ordering::SeqCst), 1);

    let policy = LockoutPolicy::new(Arc::new(FileStore::new(&store_path)));
    assert_eq!(policy.lockout_state(), LockoutState::Unlocked);
    assert_eq!(policy.attempts().get(), 0);

    if let Some(dir) = store_path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

/// A short lockout ticks down to zero, then clears state and redirects once.
#[tokio::test]
async fn test_short_lockout_counts_down_and_redirects() {
    let store_path = scratch_store("short");
    lock_ending_in(&store_path, Duration::milliseconds(1500));

    let (timer, redirects) = counting_timer(&store_path);
    let broadcaster = CountdownBroadcaster::default();
    let mut events = broadcaster.subscribe();
    let started = Instant::now();
    let task = CountdownTask::spawn(timer, StdDuration::from_millis(50), broadcaster);

    let mut received = Vec::new();
    loop {
        let event = timeout(StdDuration::from_secs(5), events.recv())
            .await
            .expect("Countdown did not finish in time")
            .expect("Channel closed");
        let done = event.is_final();
        received.push(event);
        if done {
            break;
        }
    }

    assert!(matches!(received.first(), Some(CountdownEvent::Started { .. })));
    assert_eq!(received.last(), Some(&CountdownEvent::Expired));
    assert!(started.elapsed() >= StdDuration::from_millis(500));

    let remaining: Vec<RemainingDuration> = received
        .iter()
        .filter_map(|event| match event {
            CountdownEvent::Tick { remaining } => Some(*remaining),
            _ => None,
        })
        .collect();
    assert!(!remaining.is_empty(), "Expected at least one tick");
    assert!(remaining.iter().all(|r| r.total_seconds() <= 2 && !r.is_zero()));
    assert!(remaining
        .windows(2)
        .all(|pair| pair[0].total_seconds() >= pair[1].total_seconds()));

    assert_eq!(task.join().await, CountdownOutcome::Expired);
    assert_eq!(redirects.load(Ordering::SeqCst), 1);
    assert!(!LockoutPolicy::new(Arc::new(FileStore::new(&store_path))).is_locked());

    if let Some(dir) = store_path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

/// Cancelling the countdown leaves the lockout in place for the next run.
#[tokio::test]
async fn test_cancelled_countdown_keeps_lockout() {
    let store_path = scratch_store("cancelled");
    lock_ending_in(&store_path, Duration::seconds(LOCKOUT_DURATION_SECS));

    let (timer, redirects) = counting_timer(&store_path);
    let broadcaster = CountdownBroadcaster::default();
    let mut events = broadcaster.subscribe();
    let task = CountdownTask::spawn(timer, StdDuration::from_millis(50), broadcaster);

    let first = timeout(StdDuration::from_secs(2), events.recv())
        .await
        .expect("No event before timeout")
        .expect("Channel closed");
    let CountdownEvent::Started { expires_at } = first else {
        panic!("Expected Started, got: {first:?}");
    };
    let remaining = RemainingDuration::between(expires_at, Utc::now());
    assert_eq!(remaining.hours, 0);
    assert!(remaining.minutes >= 59);

    task.cancel();
    assert_eq!(task.join().await, CountdownOutcome::Cancelled);
    assert_eq!(redirects.load(Ordering::SeqCst), 0);

    let policy = LockoutPolicy::new(Arc::new(FileStore::new(&store_path)));
    assert_eq!(policy.lockout_state(), LockoutState::Locked { expires_at });

    if let Some(dir) = store_path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

/// With no lockout persisted the task ends at once without redirecting.
#[tokio::test]
async fn test_no_lockout_is_idle() {
    let store_path = scratch_store("idle");

    let (timer, redirects) = counting_timer(&store_path);
    let task = CountdownTask::spawn(
        timer,
        StdDuration::from_millis(50),
        CountdownBroadcaster::default(),
    );

    assert_eq!(task.join().await, CountdownOutcome::Idle);
    assert_eq!(redirects.load(Ordering::SeqCst), 0);
}
