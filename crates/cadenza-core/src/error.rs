// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cadenza-core.
//!
//! Every use case returns a [`CoreError`]. Validation failures carry the exact
//! human-readable reason, batch precondition failures list every offending id,
//! and invariant violations surface as [`CoreError::IllegalState`].

use std::fmt;

use uuid::Uuid;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by the goal lifecycle engine and its storage gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    /// Goal description attributes were rejected before any write.
    InvalidGoalDescription {
        /// Why the description was rejected.
        reason: String,
    },

    /// Goal instance attributes were rejected before any write.
    InvalidGoalInstance {
        /// Why the instance was rejected.
        reason: String,
    },

    /// A precondition on the targeted goals did not hold.
    IllegalArgument {
        /// Description of every violation.
        message: String,
    },

    /// Stored data is in a state the engine cannot make progress from.
    IllegalState {
        /// Description of the corrupted or unreachable state.
        message: String,
    },

    /// The requested change is recognised but not supported yet.
    NotImplemented {
        /// The unsupported feature.
        feature: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidGoalDescription { .. } => "INVALID_GOAL_DESCRIPTION",
            Self::InvalidGoalInstance { .. } => "INVALID_GOAL_INSTANCE",
            Self::IllegalArgument { .. } => "ILLEGAL_ARGUMENT",
            Self::IllegalState { .. } => "ILLEGAL_STATE",
            Self::NotImplemented { .. } => "NOT_IMPLEMENTED",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether the caller can fix this error by changing its input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidGoalDescription { .. } | Self::InvalidGoalInstance { .. }
        )
    }

    pub(crate) fn invalid_description(reason: impl Into<String>) -> Self {
        Self::InvalidGoalDescription {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_instance(reason: impl Into<String>) -> Self {
        Self::InvalidGoalInstance {
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGoalDescription { reason } => {
                write!(f, "Invalid goal description: {}", reason)
            }
            Self::InvalidGoalInstance { reason } => {
                write!(f, "Invalid goal instance: {}", reason)
            }
            Self::IllegalArgument { message } => write!(f, "Illegal argument: {}", message),
            Self::IllegalState { message } => write!(f, "Illegal state: {}", message),
            Self::NotImplemented { feature } => write!(f, "Not implemented: {}", feature),
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

/// Render a list of ids the way batch validation messages print them.
pub(crate) fn format_ids<'a>(ids: impl IntoIterator<Item = &'a Uuid>) -> String {
    let rendered: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

/// Collects batch violations so a use case can report all of them at once.
#[derive(Debug, Default)]
pub(crate) struct Violations {
    messages: Vec<String>,
}

impl Violations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a violation for `ids` unless the list is empty.
    pub(crate) fn check(&mut self, ids: &[Uuid], what: &str) {
        if !ids.is_empty() {
            self.messages.push(format!("{}: {}", what, format_ids(ids)));
        }
    }

    /// Fail with [`CoreError::IllegalArgument`] if anything was recorded.
    pub(crate) fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            Ok(())
        } else {
            Err(CoreError::illegal_argument(self.messages.join("; ")))
        }
    }
}
