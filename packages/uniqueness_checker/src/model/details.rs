use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{SecureHash, StateRef, UniquenessCheckError, UniquenessCheckResult};

/// The stored outcome for a transaction id. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub transaction_id: SecureHash,
    pub originator_x500_name: String,
    /// Upper bound of the time window the transaction was checked against.
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiry: Option<OffsetDateTime>,
    pub result: UniquenessCheckResult,
}

/// A state known to the store. `consuming_transaction_id` moves from `None` to `Some` at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDetails {
    pub state_ref: StateRef,
    pub consuming_transaction_id: Option<SecureHash>,
}

impl StateDetails {
    pub fn unconsumed(state_ref: StateRef) -> Self {
        Self {
            state_ref,
            consuming_transaction_id: None,
        }
    }

    pub fn consumed(state_ref: StateRef, consuming_transaction_id: SecureHash) -> Self {
        Self {
            state_ref,
            consuming_transaction_id: Some(consuming_transaction_id),
        }
    }
}

/// Diagnostic detail for a rejected transaction. Always stored next to a `Failure` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedTransactionDetails {
    pub transaction_id: SecureHash,
    pub error: UniquenessCheckError,
}
