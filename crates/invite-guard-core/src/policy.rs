//! Attempt counting and lockout policy.
//!
//! The policy counts consecutive rejected invite codes and, once the count
//! reaches [`MAX_INVALID_ATTEMPTS`], locks further submissions for
//! [`LOCKOUT_DURATION_SECS`]. All state lives in a [`LockoutStore`].
//!
//! The lockout is a client-side affordance. It fails open: storage errors and
//! corrupt values read as "unlocked, zero attempts". Real enforcement belongs
//! to the server that validates codes.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{GuardError, Result};
use crate::store::{LockoutStore, StoreKey};

/// Consecutive invalid codes allowed before the lockout starts.
pub const MAX_INVALID_ATTEMPTS: u32 = 10;

/// Length of a lockout, in seconds.
pub const LOCKOUT_DURATION_SECS: i64 = 3600;

const TRUE: &str = "true";

// ============================================================================
// AttemptCounter
// ============================================================================

/// Number of consecutive rejected invite codes since the last reset.
///
/// Always within `0..=MAX_INVALID_ATTEMPTS`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptCounter(u32);

impl AttemptCounter {
    /// Creates a counter, clamping `value` into the valid range.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        if value > MAX_INVALID_ATTEMPTS {
            Self(MAX_INVALID_ATTEMPTS)
        } else {
            Self(value)
        }
    }

    /// Returns the raw count.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the counter after one more rejection.
    #[must_use]
    pub const fn incremented(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    /// Attempts left before the lockout starts.
    #[must_use]
    pub const fn remaining(self) -> u32 {
        MAX_INVALID_ATTEMPTS.saturating_sub(self.0)
    }

    /// Returns `true` once the threshold is reached.
    #[must_use]
    pub const fn is_exhausted(self) -> bool {
        self.0 >= MAX_INVALID_ATTEMPTS
    }

    /// The non-fatal warning shown after a rejection, if any.
    ///
    /// # Examples
    ///
    /// ```
    /// use invite_guard_core::AttemptCounter;
    ///
    /// assert_eq!(AttemptCounter::new(0).warning(), None);
    /// assert_eq!(
    ///     AttemptCounter::new(7).warning().as_deref(),
    ///     Some("3 attempts remaining")
    /// );
    /// assert_eq!(AttemptCounter::new(10).warning(), None);
    /// ```
    #[must_use]
    pub fn warning(self) -> Option<String> {
        if self.0 == 0 || self.is_exhausted() {
            return None;
        }
        Some(format!("{} attempts remaining", self.remaining()))
    }
}

impl std::fmt::Display for AttemptCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.0, MAX_INVALID_ATTEMPTS)
    }
}

// ============================================================================
// LockoutState
// ============================================================================

/// Whether invite-code submission is currently suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockoutState {
    /// Submissions are accepted.
    #[default]
    Unlocked,
    /// Submissions are blocked until `expires_at`.
    Locked {
        /// When the lockout ends.
        expires_at: DateTime<Utc>,
    },
}

impl LockoutState {
    /// Returns `true` for [`LockoutState::Locked`].
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }

    /// Returns the expiry when locked.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Unlocked => None,
            Self::Locked { expires_at } => Some(*expires_at),
        }
    }
}

// ============================================================================
// LockoutPolicy
// ============================================================================

/// Gates invite-code attempts and manages the lockout.
#[derive(Clone)]
pub struct LockoutPolicy {
    store: Arc<dyn LockoutStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LockoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutPolicy").finish_non_exhaustive()
    }
}

impl LockoutPolicy {
    /// Creates a policy over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn LockoutStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a policy over `store` reading time from `clock`.
    #[must_use]
    pub fn with_clock(store: Arc<dyn LockoutStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns the clock this policy reads time from.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Records one rejected invite code.
    ///
    /// Returns the counter after the rejection. Reaching the threshold starts
    /// the lockout. While locked, nothing is counted and the exhausted counter
    /// is returned.
    pub fn record_invalid_attempt(&self) -> AttemptCounter {
        if self.is_locked() {
            debug!("Invalid attempt ignored while locked");
            return AttemptCounter::new(MAX_INVALID_ATTEMPTS);
        }

        let attempts = self.attempts().incremented();
        self.write(StoreKey::InvalidCode, TRUE);
        self.write(StoreKey::Quantity, &attempts.get().to_string());
        debug!(
            attempts = attempts.get(),
            remaining = attempts.remaining(),
            "Invalid invite code recorded"
        );

        if attempts.is_exhausted() {
            self.enter_lockout();
        }
        attempts
    }

    /// Starts a lockout of [`LOCKOUT_DURATION_SECS`] from now.
    pub fn enter_lockout(&self) -> LockoutState {
        self.write(StoreKey::DateLock, TRUE);

        // Stored with millisecond precision, so keep the returned value identical.
        let expires_at =
            (self.clock.now() + Duration::seconds(LOCKOUT_DURATION_SECS)).trunc_subsecs(3);
        self.write(StoreKey::Countdown, &expires_at.timestamp_millis().to_string());
        self.write(StoreKey::Timer, TRUE);

        self.delete(StoreKey::DateLock);
        self.delete(StoreKey::InvalidCode);

        info!(expires_at = %expires_at, "Invite-code entry locked");
        LockoutState::Locked { expires_at }
    }

    /// Clears the attempt counter and every lockout flag.
    ///
    /// Idempotent.
    pub fn reset(&self) {
        match self.store.clear() {
            Ok(()) => debug!("Lockout state cleared"),
            Err(e) => warn!(error = %e, "Failed to clear lockout state"),
        }
    }

    /// Clears state after a successful invite validation.
    pub fn record_valid_attempt(&self) {
        self.reset();
    }

    /// Reads the persisted lockout flag.
    pub fn is_locked(&self) -> bool {
        self.read(StoreKey::Timer).as_deref() == Some(TRUE)
    }

    /// Reads the persisted attempt counter. Absent or corrupt reads as zero.
    pub fn attempts(&self) -> AttemptCounter {
        let Some(raw) = self.read(StoreKey::Quantity) else {
            return AttemptCounter::default();
        };
        raw.trim().parse::<u32>().map_or_else(
            |_| {
                warn!(raw = %raw, "Ignoring corrupt attempt counter");
                AttemptCounter::default()
            },
            AttemptCounter::new,
        )
    }

    /// Reads the persisted lockout expiry.
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        let raw = self.read(StoreKey::Countdown).unwrap_or_default();
        parse_expiry(&raw)
    }

    /// Returns the current lockout state.
    ///
    /// A lockout whose expiry has passed or is unreadable reads as unlocked.
    pub fn lockout_state(&self) -> LockoutState {
        if !self.is_locked() {
            return LockoutState::Unlocked;
        }
        match self.expires_at() {
            Ok(expires_at) if expires_at > self.clock.now() => LockoutState::Locked { expires_at },
            Ok(_) => LockoutState::Unlocked,
            Err(e) => {
                warn!(error = %e, "Lockout flag set without a readable expiry");
                LockoutState::Unlocked
            }
        }
    }

    /// Fails with [`GuardError::LockoutActive`] while submissions are blocked.
    ///
    /// A persisted lockout that has run out, or whose expiry is unreadable,
    /// is cleared here so entry reopens without a running countdown.
    pub fn ensure_unlocked(&self) -> Result<()> {
        match self.lockout_state() {
            LockoutState::Locked { expires_at } => {
                Err(GuardError::lockout_active(Some(expires_at)))
            }
            LockoutState::Unlocked => {
                if self.is_locked() {
                    info!("Stale lockout released");
                    self.reset();
                }
                Ok(())
            }
        }
    }

    fn read(&self, key: StoreKey) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Lockout store read failed, failing open");
                None
            }
        }
    }

    fn write(&self, key: StoreKey, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key = %key, error = %e, "Lockout store write failed");
        }
    }

    fn delete(&self, key: StoreKey) {
        if let Err(e) = self.store.remove(key) {
            warn!(key = %key, error = %e, "Lockout store remove failed");
        }
    }
}

/// Parses a stored expiry (milliseconds since the Unix epoch).
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .ok_or_else(|| GuardError::malformed_expiry(raw))
}
