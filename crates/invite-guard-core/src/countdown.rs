//! Countdown to the end of a lockout.
//!
//! [`CountdownTimer`] is the state machine behind the countdown view:
//!
//! - `Idle` -> `Running(expires_at)` on mount, when a lockout is persisted
//! - `Running` -> `Running` on every tick while time remains
//! - `Running` -> `Expired` once the remaining time reaches zero
//!
//! Entering `Expired` clears all lockout state and runs the [`ExitAction`]
//! exactly once. A missing or unreadable expiry expires on mount.
//!
//! The timer itself is driven by [`crate::task::CountdownTask`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::policy::LockoutPolicy;

// ============================================================================
// RemainingDuration
// ============================================================================

/// Time left until a lockout expires, split for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemainingDuration {
    /// Whole hours.
    pub hours: u64,
    /// Minutes past the hour (`0..60`).
    pub minutes: u64,
    /// Seconds past the minute (`0..60`).
    pub seconds: u64,
}

impl RemainingDuration {
    /// The zero duration.
    pub const ZERO: Self = Self {
        hours: 0,
        minutes: 0,
        seconds: 0,
    };

    /// Splits a whole number of seconds.
    #[must_use]
    pub const fn from_total_seconds(total: u64) -> Self {
        Self {
            hours: total / 3600,
            minutes: (total % 3600) / 60,
            seconds: total % 60,
        }
    }

    /// Time from `now` until `expires_at`, floored to whole seconds.
    ///
    /// Never negative: an instant in the past yields [`RemainingDuration::ZERO`].
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use invite_guard_core::RemainingDuration;
    ///
    /// let now = Utc::now();
    /// let left = RemainingDuration::between(now + Duration::milliseconds(3_661_000), now);
    /// assert_eq!(left.to_string(), "01:01:01");
    ///
    /// let past = RemainingDuration::between(now - Duration::seconds(5), now);
    /// assert!(past.is_zero());
    /// ```
    #[must_use]
    pub fn between(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let millis = (expires_at - now).num_milliseconds();
        let total_seconds = u64::try_from(millis).map_or(0, |millis| millis / 1000);
        Self::from_total_seconds(total_seconds)
    }

    /// Returns the duration as whole seconds.
    #[must_use]
    pub const fn total_seconds(&self) -> u64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }

    /// Returns `true` when no time is left.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.total_seconds() == 0
    }
}

impl std::fmt::Display for RemainingDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        )
    }
}

// ============================================================================
// ExitAction
// ============================================================================

/// Side effect performed once when a countdown expires.
///
/// In a UI this is the forced navigation back to the invite entry point.
pub trait ExitAction: Send + Sync {
    /// Called after lockout state has been cleared.
    fn on_expired(&self);
}

impl<F> ExitAction for F
where
    F: Fn() + Send + Sync,
{
    fn on_expired(&self) {
        self();
    }
}

// ============================================================================
// CountdownState and Tick
// ============================================================================

/// State of a [`CountdownTimer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CountdownState {
    /// No lockout was found at mount, or the timer has not been mounted.
    #[default]
    Idle,
    /// Counting down to `expires_at`.
    Running {
        /// When the lockout ends.
        expires_at: DateTime<Utc>,
    },
    /// The lockout has ended and its state has been cleared.
    Expired,
}

impl CountdownState {
    /// Returns `true` once the countdown has expired.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing to count down.
    Idle,
    /// Time is still left.
    Remaining(RemainingDuration),
    /// The countdown has reached zero.
    Expired,
}

// ============================================================================
// CountdownTimer
// ============================================================================

/// Countdown over a persisted lockout expiry.
pub struct CountdownTimer {
    policy: LockoutPolicy,
    exit: Arc<dyn ExitAction>,
    state: CountdownState,
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CountdownTimer {
    /// Creates an idle timer over the lockout managed by `policy`.
    #[must_use]
    pub fn new(policy: LockoutPolicy, exit: Arc<dyn ExitAction>) -> Self {
        Self {
            policy,
            exit,
            state: CountdownState::Idle,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> CountdownState {
        self.state
    }

    /// Starts counting if a lockout is persisted.
    ///
    /// Mounting a timer that is already running or expired changes nothing.
    pub fn mount(&mut self) -> CountdownState {
        if self.state != CountdownState::Idle || !self.policy.is_locked() {
            return self.state;
        }

        match self.policy.expires_at() {
            Ok(expires_at) => {
                debug!(expires_at = %expires_at, "Countdown mounted");
                self.state = CountdownState::Running { expires_at };
                if self.remaining().is_zero() {
                    self.expire();
                }
            }
            Err(e) => {
                warn!(error = %e, "Unreadable lockout expiry, releasing lockout");
                self.expire();
            }
        }
        self.state
    }

    /// Recomputes the remaining time, expiring the lockout when none is left.
    pub fn tick(&mut self) -> Tick {
        match self.state {
            CountdownState::Idle => Tick::Idle,
            CountdownState::Expired => Tick::Expired,
            CountdownState::Running { .. } => {
                let remaining = self.remaining();
                if remaining.is_zero() {
                    self.expire();
                    Tick::Expired
                } else {
                    Tick::Remaining(remaining)
                }
            }
        }
    }

    /// Time left as of now. Zero unless running.
    #[must_use]
    pub fn remaining(&self) -> RemainingDuration {
        match self.state {
            CountdownState::Running { expires_at } => {
                RemainingDuration::between(expires_at, self.policy.clock().now())
            }
            CountdownState::Idle | CountdownState::Expired => RemainingDuration::ZERO,
        }
    }

    fn expire(&mut self) {
        self.policy.reset();
        self.state = CountdownState::Expired;
        info!("Lockout expired, returning to invite entry");
        self.exit.on_expired();
    }
}
