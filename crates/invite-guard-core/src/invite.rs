//! Invite-code validation and the submission gate.
//!
//! [`InviteGate`] is the entry point for a submitted code. It refuses codes
//! while a lockout is active or when the code fails the local format check,
//! asks an [`InviteValidator`] for a verdict, and feeds that verdict to the
//! [`LockoutPolicy`]: `invalid` counts an attempt, `success` resets the counter,
//! `expired` and `used` leave it alone.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::error::{GuardError, Result};
use crate::policy::LockoutPolicy;

/// Exact length of an invite code.
pub const INVITE_CODE_LENGTH: usize = 20;

/// Checks the shape of a code before it is sent for validation.
///
/// Codes are exactly [`INVITE_CODE_LENGTH`] ASCII letters and digits.
///
/// # Examples
///
/// ```
/// use invite_guard_core::check_code_format;
///
/// assert!(check_code_format("AbCdEfGhIj0123456789").is_ok());
/// assert!(check_code_format("short").is_err());
/// assert!(check_code_format("AbCdEfGhIj012345678!").is_err());
/// ```
pub fn check_code_format(code: &str) -> Result<()> {
    if code.is_empty() {
        return Err(GuardError::malformed_invite_code("Invite-code is required"));
    }

    let length = code.chars().count();
    if length < INVITE_CODE_LENGTH {
        return Err(GuardError::malformed_invite_code("Invite-code is short"));
    }
    if length > INVITE_CODE_LENGTH {
        return Err(GuardError::malformed_invite_code(format!(
            "No more than {INVITE_CODE_LENGTH} characters"
        )));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GuardError::malformed_invite_code("Invite-code is invalid"));
    }

    Ok(())
}

// ============================================================================
// InviteStatus
// ============================================================================

/// Verdict of the invite validation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteStatus {
    /// The code can be used to register.
    #[serde(rename = "success")]
    Success,
    /// The code exists but its expiration date has passed.
    #[serde(rename = "expired")]
    Expired,
    /// The code exists but has no usages left.
    #[serde(rename = "used")]
    Used,
    /// No such code.
    #[serde(rename = "invalid code")]
    Invalid,
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Expired => write!(f, "expired"),
            Self::Used => write!(f, "used"),
            Self::Invalid => write!(f, "invalid code"),
        }
    }
}

/// Decides whether an invite code is usable.
pub trait InviteValidator: Send + Sync {
    /// Returns the verdict for `code`.
    fn check(&self, code: &str) -> InviteStatus;
}

// ============================================================================
// Invite and InviteRegistry
// ============================================================================

/// An issued invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    /// The code handed to the invitee.
    pub code: String,

    /// Registrations still allowed with this code.
    pub usage_count: i32,

    /// When the code stops being accepted, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl Invite {
    /// Creates a non-expiring invite.
    #[must_use]
    pub fn new(code: impl Into<String>, usage_count: i32) -> Self {
        Self {
            code: code.into(),
            usage_count,
            expiration_date: None,
        }
    }

    /// Sets the expiration date.
    #[must_use]
    pub const fn with_expiration(mut self, expiration_date: DateTime<Utc>) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }

    /// Classifies this invite as of `now`. Expiry wins over exhaustion.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> InviteStatus {
        if self.expiration_date.is_some_and(|expiration| expiration < now) {
            InviteStatus::Expired
        } else if self.usage_count <= 0 {
            InviteStatus::Used
        } else {
            InviteStatus::Success
        }
    }
}

/// Validator over a local set of invites.
pub struct InviteRegistry {
    invites: HashMap<String, Invite>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InviteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InviteRegistry")
            .field("invites", &self.invites.len())
            .finish_non_exhaustive()
    }
}

impl InviteRegistry {
    /// Creates a registry using the system clock.
    #[must_use]
    pub fn new(invites: impl IntoIterator<Item = Invite>) -> Self {
        Self::with_clock(invites, Arc::new(SystemClock))
    }

    /// Creates a registry reading time from `clock`.
    #[must_use]
    pub fn with_clock(invites: impl IntoIterator<Item = Invite>, clock: Arc<dyn Clock>) -> Self {
        let invites = invites
            .into_iter()
            .map(|invite| (invite.code.clone(), invite))
            .collect();
        Self { invites, clock }
    }

    /// Loads a JSON array of invites from `path`.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::RegistryParseError` if the file cannot be read or
    /// is not a JSON array of invites.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GuardError::registry_parse(path, format!("failed to read file: {e}")))?;
        let invites: Vec<Invite> = serde_json::from_str(&contents)
            .map_err(|e| GuardError::registry_parse(path, e.to_string()))?;
        debug!(path = %path.display(), count = invites.len(), "Invite registry loaded");
        Ok(Self::new(invites))
    }

    /// Returns the number of invites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invites.len()
    }

    /// Returns `true` if the registry holds no invites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }
}

impl InviteValidator for InviteRegistry {
    fn check(&self, code: &str) -> InviteStatus {
        self.invites
            .get(code)
            .map_or(InviteStatus::Invalid, |invite| {
                invite.status_at(self.clock.now())
            })
    }
}

// ============================================================================
// InviteGate
// ============================================================================

/// Runs a submitted code through the lockout policy and the validator.
#[derive(Clone)]
pub struct InviteGate {
    validator: Arc<dyn InviteValidator>,
    policy: LockoutPolicy,
}

impl std::fmt::Debug for InviteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InviteGate")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl InviteGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(validator: Arc<dyn InviteValidator>, policy: LockoutPolicy) -> Self {
        Self { validator, policy }
    }

    /// Returns the policy behind this gate.
    #[must_use]
    pub const fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Submits `code`.
    ///
    /// Returns `Ok(())` when the code is accepted; the attempt counter is then
    /// cleared. Every refusal is a non-fatal [`GuardError`]:
    ///
    /// - `LockoutActive` while locked, or when this rejection started the lockout
    /// - `MalformedInviteCode` when the format check fails (nothing is counted)
    /// - `ValidationRejected` for an unknown code
    /// - `InviteExpired` / `InviteUsedUp` for known but unusable codes
    pub fn submit(&self, code: &str) -> Result<()> {
        self.policy.ensure_unlocked()?;
        check_code_format(code)?;

        let status = self.validator.check(code);
        debug!(code = %code, status = %status, "Invite code checked");

        match status {
            InviteStatus::Success => {
                self.policy.record_valid_attempt();
                info!("Invite code accepted");
                Ok(())
            }
            InviteStatus::Expired => Err(GuardError::InviteExpired),
            InviteStatus::Used => Err(GuardError::InviteUsedUp),
            InviteStatus::Invalid => {
                let attempts = self.policy.record_invalid_attempt();
                if attempts.is_exhausted() {
                    return Err(GuardError::lockout_active(self.policy.expires_at().ok()));
                }
                info!(attempts = attempts.get(), "Invite code rejected");
                Err(GuardError::validation_rejected(
                    attempts.get(),
                    attempts.remaining(),
                ))
            }
        }
    }
}
