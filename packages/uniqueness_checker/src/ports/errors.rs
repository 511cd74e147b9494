use serde::Serialize;
use strum::Display;
use thiserror::Error as ThisError;

/// How the retry coordinator should react to a storage failure.
///
/// The category is assigned by the backing store's own categoriser, so the engine never has to
/// inspect driver specific error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageErrorCategory {
    /// Connection loss, lock timeouts, deadlocks, serialization failures.
    Transient,
    /// Constraint violations, grammar or mapping errors, in-flight double spends.
    DataRelated,
    /// Closed resources, session misuse. The environment is broken.
    Fatal,
    /// Anything the categoriser does not recognise.
    Uncategorized,
}

impl StorageErrorCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCategory::Transient | StorageErrorCategory::DataRelated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BackingStoreErrorKind {
    Session,
    Begin,
    GetTransactionDetails,
    GetStateDetails,
    CreateStates,
    ConsumeStates,
    /// A conditional consume touched zero rows: another writer consumed the state first.
    InFlightConflict,
    CommitTransactions,
    Commit,
    Rollback,
    ParseError,
    /// A `Failure` transaction row has no matching rejection details row.
    MissingRejectionDetails,
}

#[derive(Debug, Clone, Eq, PartialEq, ThisError)]
#[error("Backing Store Error kind={kind} category={category} reason={reason} data={data:?}")]
pub struct BackingStoreError {
    pub kind: BackingStoreErrorKind,
    pub category: StorageErrorCategory,
    pub reason: String,
    pub data: Option<String>,
}

impl BackingStoreError {
    pub fn new(kind: BackingStoreErrorKind, category: StorageErrorCategory, reason: impl Into<String>) -> Self {
        Self {
            kind,
            category,
            reason: reason.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn in_flight_conflict(consuming_transaction_id: impl ToString, state_ref: impl ToString) -> Self {
        Self::new(
            BackingStoreErrorKind::InFlightConflict,
            StorageErrorCategory::DataRelated,
            format!(
                "No state was consumed for transaction {}, this might be an in-flight double spend",
                consuming_transaction_id.to_string()
            ),
        )
        .with_data(state_ref.to_string())
    }

    pub fn missing_rejection_details(transaction_id: impl ToString) -> Self {
        Self::new(
            BackingStoreErrorKind::MissingRejectionDetails,
            StorageErrorCategory::Uncategorized,
            "Transaction was recorded as a failure but no rejection details exist",
        )
        .with_data(transaction_id.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}
