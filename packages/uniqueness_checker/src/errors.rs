use strum::Display;
use thiserror::Error as ThisError;

use crate::ports::errors::{BackingStoreError, StorageErrorCategory};

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CommonError {
    #[error("Parse Error input={data} with reason={reason}")]
    ParseError { data: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UniquenessCheckerErrorKind {
    /// Every attempt failed with a retryable storage error.
    RetriesExhausted,
    /// The store reported that the environment is broken.
    FatalStorage,
    /// The store raised something its categoriser did not recognise.
    UncategorizedStorage,
    /// The caller's wall-clock budget ran out before the sub-batch finished.
    Timeout,
}

/// Terminal failure of one sub-batch. Every request in the sub-batch is answered with an
/// unhandled-exception result built from this error; nothing about it is stored.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("Uniqueness checker error kind={kind} after attempts={attempts} reason={reason} data={data:?}")]
pub struct UniquenessCheckerError {
    pub kind: UniquenessCheckerErrorKind,
    pub attempts: u32,
    pub reason: String,
    pub data: Option<String>,
}

impl UniquenessCheckerError {
    pub fn from_storage_error(error: BackingStoreError, attempts: u32) -> Self {
        let kind = match error.category {
            StorageErrorCategory::Fatal => UniquenessCheckerErrorKind::FatalStorage,
            StorageErrorCategory::Uncategorized => UniquenessCheckerErrorKind::UncategorizedStorage,
            StorageErrorCategory::Transient | StorageErrorCategory::DataRelated => UniquenessCheckerErrorKind::RetriesExhausted,
        };

        Self {
            kind,
            attempts,
            reason: error.to_string(),
            data: error.data,
        }
    }

    pub fn retries_exhausted(attempts: u32, last_error: Option<BackingStoreError>) -> Self {
        Self {
            kind: UniquenessCheckerErrorKind::RetriesExhausted,
            attempts,
            reason: format!("Retry budget of {attempts} attempts exhausted"),
            data: last_error.map(|e| e.to_string()),
        }
    }

    pub fn timeout(budget_ms: u64) -> Self {
        Self {
            kind: UniquenessCheckerErrorKind::Timeout,
            attempts: 0,
            reason: format!("Call budget of {budget_ms}ms expired before the sub-batch completed"),
            data: None,
        }
    }
}
