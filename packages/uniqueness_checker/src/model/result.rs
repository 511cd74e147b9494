use serde::{Deserialize, Serialize};
use strum::Display;
use time::OffsetDateTime;

use super::{SecureHash, StateDetails, StateRef};

/// Why a request was rejected. Every variant is a normal, user visible outcome except
/// `UnhandledException`, which wraps a failure of the engine itself and is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UniquenessCheckError {
    InputStateConflict {
        conflicting_states: Vec<StateDetails>,
    },
    InputStateUnknown {
        unknown_states: Vec<StateRef>,
    },
    ReferenceStateConflict {
        conflicting_states: Vec<StateDetails>,
    },
    ReferenceStateUnknown {
        unknown_states: Vec<StateRef>,
    },
    TimeWindowOutOfBounds {
        #[serde(with = "time::serde::rfc3339")]
        evaluation_timestamp: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339::option")]
        lower_bound: Option<OffsetDateTime>,
        #[serde(with = "time::serde::rfc3339::option")]
        upper_bound: Option<OffsetDateTime>,
    },
    /// READ checks only.
    TimeWindowBeforeLowerBound {
        #[serde(with = "time::serde::rfc3339")]
        evaluation_timestamp: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339")]
        lower_bound: OffsetDateTime,
    },
    /// READ checks only.
    NotPreviouslySeenTransaction,
    MalformedRequest {
        error_text: String,
    },
    UnhandledException {
        exception_type: String,
        exception_message: String,
    },
}

impl UniquenessCheckError {
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            UniquenessCheckError::InputStateConflict { .. } => OutcomeKind::InputStateConflict,
            UniquenessCheckError::InputStateUnknown { .. } => OutcomeKind::InputStateUnknown,
            UniquenessCheckError::ReferenceStateConflict { .. } => OutcomeKind::ReferenceStateConflict,
            UniquenessCheckError::ReferenceStateUnknown { .. } => OutcomeKind::ReferenceStateUnknown,
            UniquenessCheckError::TimeWindowOutOfBounds { .. } => OutcomeKind::TimeWindowOutOfBounds,
            UniquenessCheckError::TimeWindowBeforeLowerBound { .. } => OutcomeKind::TimeWindowBeforeLowerBound,
            UniquenessCheckError::NotPreviouslySeenTransaction => OutcomeKind::NotPreviouslySeenTransaction,
            UniquenessCheckError::MalformedRequest { .. } => OutcomeKind::MalformedRequest,
            UniquenessCheckError::UnhandledException { .. } => OutcomeKind::UnhandledException,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum UniquenessCheckResult {
    Success {
        #[serde(with = "time::serde::rfc3339")]
        commit_timestamp: OffsetDateTime,
    },
    Failure {
        #[serde(with = "time::serde::rfc3339")]
        commit_timestamp: OffsetDateTime,
        error: UniquenessCheckError,
    },
}

impl UniquenessCheckResult {
    pub fn success(commit_timestamp: OffsetDateTime) -> Self {
        UniquenessCheckResult::Success { commit_timestamp }
    }

    pub fn failure(commit_timestamp: OffsetDateTime, error: UniquenessCheckError) -> Self {
        UniquenessCheckResult::Failure { commit_timestamp, error }
    }

    pub fn commit_timestamp(&self) -> OffsetDateTime {
        match self {
            UniquenessCheckResult::Success { commit_timestamp } | UniquenessCheckResult::Failure { commit_timestamp, .. } => *commit_timestamp,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UniquenessCheckResult::Success { .. })
    }

    pub fn error(&self) -> Option<&UniquenessCheckError> {
        match self {
            UniquenessCheckResult::Success { .. } => None,
            UniquenessCheckResult::Failure { error, .. } => Some(error),
        }
    }

    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            UniquenessCheckResult::Success { .. } => OutcomeKind::Success,
            UniquenessCheckResult::Failure { error, .. } => error.outcome_kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquenessCheckResponse {
    /// `None` only when the request's transaction id could not be parsed.
    pub transaction_id: Option<SecureHash>,
    pub result: UniquenessCheckResult,
}

/// Outcome label used when reporting metrics. `Duplicate` marks an idempotent replay of a
/// previously stored result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Duplicate,
    MalformedRequest,
    InputStateUnknown,
    ReferenceStateUnknown,
    InputStateConflict,
    ReferenceStateConflict,
    TimeWindowOutOfBounds,
    TimeWindowBeforeLowerBound,
    NotPreviouslySeenTransaction,
    UnhandledException,
}
