//! End-to-end tests for invite-code submission and lockout.
//!
//! These tests wire the gate to the fixture registry and a file-backed store,
//! the same way the `invite-guard` binary does.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, Utc};
use invite_guard_core::{
    Config, FileStore, GuardError, InviteGate, InviteRegistry, InviteStatus, InviteValidator,
    LockoutPolicy, LockoutState, ManualClock,
};

const VALID: &str = "WelcomeAboard2026abc";
const EXPIRED: &str = "LastYearsInvite00001";
const USED: &str = "AlreadyRedeemed00002";
const UNKNOWN: &str = "NoSuchInviteCode0000";

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// A fresh scratch directory for one test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "invite_guard_it_{name}_{}",
        std::process::id()
    ));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}

fn gate_at(store_path: &Path) -> InviteGate {
    let registry = InviteRegistry::load_from_file(&fixture_path().join("invites.json"))
        .expect("Failed to load fixture registry");
    let policy = LockoutPolicy::new(Arc::new(FileStore::new(store_path)));
    InviteGate::new(Arc::new(registry), policy)
}

fn read_state(store_path: &Path) -> BTreeMap<String, String> {
    let contents = std::fs::read_to_string(store_path).expect("State file missing");
    serde_json::from_str(&contents).expect("State file is not a JSON object")
}

/// Tests that the sample config loads with its overrides.
#[test]
fn test_sample_config_loads() {
    let config = Config::load_from_dir(&fixture_path()).expect("Failed to load config");

    assert_eq!(config.store_file, "state/lockout.json");
    assert_eq!(config.invites_file, "invites.json");
    assert_eq!(config.tick_millis, 50);
    assert!(config.invites_path(&fixture_path()).exists());
}

/// Tests that the fixture registry classifies every kind of code.
#[test]
fn test_fixture_registry_classification() {
    let registry = InviteRegistry::load_from_file(&fixture_path().join("invites.json"))
        .expect("Failed to load fixture registry");

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.check(VALID), InviteStatus::Success);
    assert_eq!(registry.check(EXPIRED), InviteStatus::Expired);
    assert_eq!(registry.check(USED), InviteStatus::Used);
    assert_eq!(registry.check(UNKNOWN), InviteStatus::Invalid);
}

/// Ten invalid codes lock entry for an hour, and the lock survives a restart.
#[test]
fn test_ten_invalid_codes_lock_entry() {
    let dir = scratch_dir("ten_invalid");
    let store_path = dir.join("state/lockout.json");
    let gate = gate_at(&store_path);

    for expected in 1..=9u32 {
        match gate.submit(UNKNOWN) {
            Err(GuardError::ValidationRejected {
                attempts,
                remaining,
            }) => {
                assert_eq!(attempts, expected);
                assert_eq!(remaining, 10 - expected);
            }
            other => panic!("Expected ValidationRejected, got: {other:?}"),
        }
    }

    let before = Utc::now();
    let err = gate.submit(UNKNOWN).expect_err("Tenth attempt should lock");
    let GuardError::LockoutActive {
        expires_at: Some(expires_at),
    } = err
    else {
        panic!("Expected LockoutActive with expiry, got: {err:?}");
    };
    let expected = before + Duration::hours(1);
    assert!(
        (expires_at - expected).num_seconds().abs() <= 2,
        "Expiry {expires_at} should be about an hour after {before}"
    );

    let state = read_state(&store_path);
    assert_eq!(state.get("timer").map(String::as_str), Some("true"));
    assert_eq!(
        state.get("countdown").map(String::as_str),
        Some(expires_at.timestamp_millis().to_string().as_str())
    );
    assert!(!state.contains_key("date_lock"));
    assert!(!state.contains_key("invalid_code"));

    // A new process sees the same lockout and refuses even a valid code
    let restarted = gate_at(&store_path);
    assert_eq!(
        restarted.policy().lockout_state(),
        LockoutState::Locked { expires_at }
    );
    assert!(matches!(
        restarted.submit(VALID),
        Err(GuardError::LockoutActive { .. })
    ));
    assert_eq!(restarted.policy().attempts().get(), 10);

    std::fs::remove_dir_all(&dir).ok();
}

/// A valid code clears earlier rejections.
#[test]
fn test_valid_code_resets_counter() {
    let dir = scratch_dir("valid_resets");
    let store_path = dir.join("lockout.json");
    let gate = gate_at(&store_path);

    for _ in 0..4 {
        assert!(gate.submit(UNKNOWN).is_err());
    }
    assert_eq!(gate.policy().attempts().get(), 4);

    gate.submit(VALID).expect("Valid code should be accepted");
    assert_eq!(gate.policy().attempts().get(), 0);
    assert!(read_state(&store_path).is_empty());

    // The count starts over
    assert!(matches!(
        gate.submit(UNKNOWN),
        Err(GuardError::ValidationRejected {
            attempts: 1,
            remaining: 9
        })
    ));

    std::fs::remove_dir_all(&dir).ok();
}

/// Expired, used and malformed codes never move the counter.
#[test]
fn test_non_invalid_rejections_are_not_counted() {
    let dir = scratch_dir("not_counted");
    let store_path = dir.join("lockout.json");
    let gate = gate_at(&store_path);

    for _ in 0..20 {
        assert!(matches!(gate.submit(EXPIRED), Err(GuardError::InviteExpired)));
        assert!(matches!(gate.submit(USED), Err(GuardError::InviteUsedUp)));
        assert!(matches!(
            gate.submit("too-short"),
            Err(GuardError::MalformedInviteCode { .. })
        ));
    }

    assert_eq!(gate.policy().attempts().get(), 0);
    assert!(!gate.policy().is_locked());

    std::fs::remove_dir_all(&dir).ok();
}

/// A corrupt state file reads as a clean slate.
#[test]
fn test_corrupt_state_file_fails_open() {
    let dir = scratch_dir("corrupt_state");
    let store_path = dir.join("lockout.json");
    std::fs::write(&store_path, "{ this is not json").expect("Failed to write state");

    let gate = gate_at(&store_path);
    assert!(!gate.policy().is_locked());
    assert_eq!(gate.policy().attempts().get(), 0);

    assert!(matches!(
        gate.submit(UNKNOWN),
        Err(GuardError::ValidationRejected { attempts: 1, .. })
    ));
    assert_eq!(
        read_state(&store_path).get("quantity").map(String::as_str),
        Some("1")
    );

    std::fs::remove_dir_all(&dir).ok();
}

/// Reset unlocks entry immediately.
#[test]
fn test_reset_unlocks() {
    let dir = scratch_dir("reset_unlocks");
    let store_path = dir.join("lockout.json");
    let gate = gate_at(&store_path);

    for _ in 0..10 {
        assert!(gate.submit(UNKNOWN).is_err());
    }
    assert!(gate.policy().is_locked());

    gate.policy().reset();
    gate.policy().reset();

    assert_eq!(gate.policy().lockout_state(), LockoutState::Unlocked);
    gate.submit(VALID).expect("Valid code should be accepted after reset");

    std::fs::remove_dir_all(&dir).ok();
}

/// A lockout whose hour passed while nothing was counting down no longer blocks.
#[test]
fn test_elapsed_lockout_does_not_block() {
    let dir = scratch_dir("elapsed_lockout");
    let store_path = dir.join("lockout.json");

    let earlier = LockoutPolicy::with_clock(
        Arc::new(FileStore::new(&store_path)),
        Arc::new(ManualClock::new(Utc::now() - Duration::hours(2))),
    );
    earlier.enter_lockout();

    let gate = gate_at(&store_path);
    assert_eq!(gate.policy().lockout_state(), LockoutState::Unlocked);
    gate.submit(VALID).expect("Elapsed lockout should not block");
    assert!(!gate.policy().is_locked());

    std::fs::remove_dir_all(&dir).ok();
}
