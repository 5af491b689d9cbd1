//! Invite Guard
//!
//! Counts rejected invite-code submissions, locks further entry for an hour
//! after the tenth, and runs the countdown that lifts the lockout.

pub mod clock;
pub mod config;
pub mod countdown;
pub mod error;
pub mod invite;
pub mod policy;
pub mod store;
pub mod task;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, CONFIG_FILE_NAME};
pub use countdown::{CountdownState, CountdownTimer, ExitAction, RemainingDuration, Tick};
pub use error::{GuardError, Result};
pub use invite::{
    check_code_format, Invite, InviteGate, InviteRegistry, InviteStatus, InviteValidator,
    INVITE_CODE_LENGTH,
};
pub use policy::{
    AttemptCounter, LockoutPolicy, LockoutState, LOCKOUT_DURATION_SECS, MAX_INVALID_ATTEMPTS,
};
pub use store::{FileStore, LockoutStore, MemoryStore, StoreKey};
pub use task::{CountdownBroadcaster, CountdownEvent, CountdownOutcome, CountdownTask};
