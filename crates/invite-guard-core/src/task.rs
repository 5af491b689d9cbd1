//! Scheduled countdown task and its event stream.
//!
//! [`CountdownTask::spawn`] mounts a [`CountdownTimer`] and ticks it on a
//! tokio interval until it expires. Progress is published as
//! [`CountdownEvent`]s through a [`CountdownBroadcaster`].
//!
//! The task is owned by its handle: [`CountdownTask::cancel`] stops it, and
//! dropping the handle aborts it, so no tick fires after the owner is gone.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use invite_guard_core::{
//!     CountdownBroadcaster, CountdownTask, CountdownTimer, LockoutPolicy, MemoryStore,
//! };
//!
//! # async fn example() {
//! let policy = LockoutPolicy::new(Arc::new(MemoryStore::new()));
//! let timer = CountdownTimer::new(policy, Arc::new(|| println!("back to invite entry")));
//!
//! let broadcaster = CountdownBroadcaster::default();
//! let mut events = broadcaster.subscribe();
//! let task = CountdownTask::spawn(timer, Duration::from_secs(1), broadcaster);
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//!     if event.is_final() {
//!         break;
//!     }
//! }
//! let outcome = task.join().await;
//! # }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::countdown::{CountdownState, CountdownTimer, RemainingDuration, Tick};

// ============================================================================
// Events
// ============================================================================

/// Progress of a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountdownEvent {
    /// The timer mounted over a persisted lockout.
    Started {
        /// When the lockout ends.
        expires_at: DateTime<Utc>,
    },
    /// One tick with time still left.
    Tick {
        /// Time left as of this tick.
        remaining: RemainingDuration,
    },
    /// The lockout ended and its state was cleared.
    Expired,
    /// The owner cancelled the countdown before it expired.
    Cancelled,
}

impl CountdownEvent {
    /// Returns the event type name as used in serialized form.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Tick { .. } => "tick",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for the last event a countdown publishes.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }
}

/// Publishes countdown events to every subscriber.
///
/// Subscribe before spawning the task to see its first events. Once a final
/// event has been published, later events are dropped, so subscribers never
/// see a tick after `Cancelled` or `Expired`.
#[derive(Debug, Clone)]
pub struct CountdownBroadcaster {
    sender: broadcast::Sender<CountdownEvent>,
    finished: Arc<Mutex<bool>>,
}

impl CountdownBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            finished: Arc::new(Mutex::new(false)),
        }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CountdownEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers will see it.
    pub fn send(&self, event: CountdownEvent) -> usize {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        if *finished {
            return 0;
        }
        *finished = event.is_final();
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CountdownBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

// ============================================================================
// CountdownTask
// ============================================================================

/// How a countdown task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownOutcome {
    /// No lockout was persisted when the task started.
    Idle,
    /// The lockout ran out and was cleared.
    Expired,
    /// The task was cancelled first.
    Cancelled,
}

/// Handle to a spawned countdown.
#[derive(Debug)]
pub struct CountdownTask {
    handle: Option<JoinHandle<CountdownOutcome>>,
    broadcaster: CountdownBroadcaster,
}

impl CountdownTask {
    /// Spawns `timer` on the current tokio runtime, ticking every `period`.
    ///
    /// The first tick happens immediately after mount.
    #[must_use]
    pub fn spawn(
        timer: CountdownTimer,
        period: Duration,
        broadcaster: CountdownBroadcaster,
    ) -> Self {
        let events = broadcaster.clone();
        let handle = tokio::spawn(run_countdown(timer, period, events));
        Self {
            handle: Some(handle),
            broadcaster,
        }
    }

    /// Stops the countdown. Persisted lockout state is left untouched.
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            if !handle.is_finished() {
                handle.abort();
                self.broadcaster.send(CountdownEvent::Cancelled);
                debug!("Countdown cancelled");
            }
        }
    }

    /// Waits for the task to finish.
    pub async fn join(mut self) -> CountdownOutcome {
        let Some(handle) = self.handle.take() else {
            return CountdownOutcome::Cancelled;
        };
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => CountdownOutcome::Cancelled,
            Err(e) => {
                error!(error = %e, "Countdown task failed");
                CountdownOutcome::Cancelled
            }
        }
    }
}

impl Drop for CountdownTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_countdown(
    mut timer: CountdownTimer,
    period: Duration,
    events: CountdownBroadcaster,
) -> CountdownOutcome {
    match timer.mount() {
        CountdownState::Idle => return CountdownOutcome::Idle,
        CountdownState::Expired => {
            events.send(CountdownEvent::Expired);
            return CountdownOutcome::Expired;
        }
        CountdownState::Running { expires_at } => {
            events.send(CountdownEvent::Started { expires_at });
        }
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match timer.tick() {
            Tick::Remaining(remaining) => {
                debug!(remaining = %remaining, "Countdown tick");
                events.send(CountdownEvent::Tick { remaining });
            }
            Tick::Expired => {
                events.send(CountdownEvent::Expired);
                return CountdownOutcome::Expired;
            }
            Tick::Idle => return CountdownOutcome::Idle,
        }
    }
}
