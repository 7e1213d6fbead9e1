//! Error types for the battle engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`BattleError`].
pub type Result<T> = std::result::Result<T, BattleError>;

/// Top-level error type for the battle engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BattleError {
    /// Session id unknown, evicted, or already terminal.
    #[error("Battle session not found: {0}")]
    SessionNotFound(String),

    /// Caller is not allowed to mutate this session.
    #[error("Caller {caller} is not the attacker of session {session}")]
    Forbidden {
        /// Session the caller tried to mutate.
        session: String,
        /// Village id of the caller.
        caller: u64,
    },

    /// Troop type key does not name a known troop.
    #[error("Unknown troop type: {0}")]
    UnknownTroopType(String),

    /// Deployment position outside the battle grid.
    #[error("Position ({x}, {y}) is outside the battle grid")]
    OutOfBounds {
        /// Requested x coordinate.
        x: i32,
        /// Requested y coordinate.
        y: i32,
    },

    /// Live troop count already at the per-session cap.
    #[error("Troop capacity exceeded: {cap} troops already deployed")]
    CapacityExceeded {
        /// Configured cap.
        cap: usize,
    },

    /// Defender layout could not be loaded.
    #[error("Defense layout unavailable for village {village}: {message}")]
    LayoutUnavailable {
        /// Defender village id.
        village: u64,
        /// Provider message.
        message: String,
    },

    /// Defender layout failed validation.
    #[error("Invalid defense layout: {0}")]
    InvalidLayout(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Final record could not be handed to the battle store.
    #[error("Failed to persist battle {session}: {message}")]
    Persistence {
        /// Session whose record failed to save.
        session: String,
        /// Store message.
        message: String,
    },

    /// A replay did not reproduce the recorded outcome.
    #[error("Replay mismatch: {0}")]
    ReplayMismatch(String),

    /// Invalid engine state.
    #[error("Invalid battle state: {0}")]
    InvalidState(String),
}

/// Stable rejection code reported to callers of the battle API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Unknown or terminal session.
    SessionNotFound,
    /// Caller is not the session's attacker.
    Forbidden,
    /// Troop type not in the catalog.
    UnknownTroopType,
    /// Position outside the grid.
    OutOfBounds,
    /// Troop cap reached.
    CapacityExceeded,
}

impl RejectReason {
    /// Wire code for this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotFound => "session-not-found",
            Self::Forbidden => "forbidden",
            Self::UnknownTroopType => "unknown-troop-type",
            Self::OutOfBounds => "out-of-bounds",
            Self::CapacityExceeded => "capacity-exceeded",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BattleError {
    /// Caller-visible rejection code, if this error is a request rejection.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::SessionNotFound(_) => Some(RejectReason::SessionNotFound),
            Self::Forbidden { .. } => Some(RejectReason::Forbidden),
            Self::UnknownTroopType(_) => Some(RejectReason::UnknownTroopType),
            Self::OutOfBounds { .. } => Some(RejectReason::OutOfBounds),
            Self::CapacityExceeded { .. } => Some(RejectReason::CapacityExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_codes() {
        let err = BattleError::OutOfBounds { x: 80, y: 10 };
        assert_eq!(err.reject_reason(), Some(RejectReason::OutOfBounds));
        assert_eq!(RejectReason::CapacityExceeded.as_str(), "capacity-exceeded");
        assert_eq!(RejectReason::SessionNotFound.to_string(), "session-not-found");
    }

    #[test]
    fn test_internal_errors_have_no_reason() {
        let err = BattleError::InvalidState("boom".into());
        assert_eq!(err.reject_reason(), None);
    }
}
