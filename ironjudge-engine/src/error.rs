//! Error types for ironjudge-engine
//!
//! Every failure is a value returned to the caller. "Quorum not yet reached"
//! and similar in-between states are modelled as state, never as errors.

use crate::store::StoreError;
use ironjudge_common::events::AttemptState;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the adjudication engine
#[derive(Error, Debug)]
pub enum Error {
    /// Declared weight or attempt sequencing rejected by the validator
    ///
    /// Reported to the submitting caller; never retried automatically.
    #[error("Validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// Vote from a judge that is not on the session's panel
    #[error("Judge {judge_id} is not on the panel for session {session_id}")]
    UnauthorizedJudge { judge_id: Uuid, session_id: Uuid },

    /// Vote on an attempt whose decision is locked
    #[error("Attempt {0} is finalized and accepts no further votes")]
    AttemptClosed(Uuid),

    /// Operation not allowed from the attempt's current state
    #[error("Invalid transition for attempt {attempt_id}: cannot {action} from {from}")]
    InvalidTransition {
        attempt_id: Uuid,
        from: AttemptState,
        action: &'static str,
    },

    /// Store collaborator failure, propagated unchanged
    ///
    /// The engine performs no implicit retries.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ironjudge_common::Error> for Error {
    fn from(e: ironjudge_common::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
