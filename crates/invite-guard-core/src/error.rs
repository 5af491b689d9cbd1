//! Error types for Invite Guard.
//!
//! The lockout variants are all recoverable: callers show a message or fall
//! back silently. Only configuration and registry loading failures are fatal,
//! and only to the CLI.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// A specialized `Result` type for Invite Guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors that can occur while gating invite-code submissions.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    // ========================================================================
    // Submission Outcomes
    // ========================================================================
    /// The validator rejected the code; the attempt counter was incremented.
    #[error("Invite-code is invalid! {remaining} attempts left")]
    ValidationRejected {
        /// Attempt counter after this rejection.
        attempts: u32,
        /// Attempts left before the lockout starts.
        remaining: u32,
    },

    /// Submissions are blocked until the lockout expires.
    #[error("Invite-code entry is blocked after too many invalid attempts")]
    LockoutActive {
        /// When the lockout ends, if the stored expiry could be read.
        expires_at: Option<DateTime<Utc>>,
    },

    /// The code exists but its expiration date has passed.
    #[error("Your invite-code has expired! Please, use another one!")]
    InviteExpired,

    /// The code exists but has no usages left.
    #[error("Invite code is fully used")]
    InviteUsedUp,

    /// The code failed the local format check and was never sent for validation.
    #[error("{reason}")]
    MalformedInviteCode {
        /// Why the code was refused.
        reason: String,
    },

    // ========================================================================
    // Persistence
    // ========================================================================
    /// The lockout store could not be read or written.
    #[error("Lockout storage unavailable: {message}")]
    PersistenceUnavailable {
        /// Description of the storage failure.
        message: String,
    },

    /// The stored lockout expiry is missing or cannot be parsed.
    #[error("Stored lockout expiry is malformed: '{raw}'")]
    MalformedExpiry {
        /// The raw stored value (empty when absent).
        raw: String,
    },

    // ========================================================================
    // Configuration and Registry Loading
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your invite-guard.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The invite registry file could not be loaded.
    #[error("Invalid invite registry '{path}': {message}\n\nSuggestion: Check that the file holds a JSON array of invites")]
    RegistryParseError {
        /// Path to the registry file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GuardError {
    /// Creates a new `ValidationRejected` error.
    #[must_use]
    pub const fn validation_rejected(attempts: u32, remaining: u32) -> Self {
        Self::ValidationRejected {
            attempts,
            remaining,
        }
    }

    /// Creates a new `LockoutActive` error.
    #[must_use]
    pub const fn lockout_active(expires_at: Option<DateTime<Utc>>) -> Self {
        Self::LockoutActive { expires_at }
    }

    /// Creates a new `MalformedInviteCode` error.
    #[must_use]
    pub fn malformed_invite_code(reason: impl Into<String>) -> Self {
        Self::MalformedInviteCode {
            reason: reason.into(),
        }
    }

    /// Creates a new `PersistenceUnavailable` error.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `MalformedExpiry` error.
    #[must_use]
    pub fn malformed_expiry(raw: impl Into<String>) -> Self {
        Self::MalformedExpiry { raw: raw.into() }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `RegistryParseError`.
    #[must_use]
    pub fn registry_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::RegistryParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error ends the program.
    ///
    /// Every lockout and submission outcome is recovered locally; only a
    /// broken configuration or registry stops the CLI.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::RegistryParseError { .. }
        )
    }

    /// Returns `true` if the submission was refused before reaching the validator.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(
            self,
            Self::LockoutActive { .. } | Self::MalformedInviteCode { .. }
        )
    }
}
