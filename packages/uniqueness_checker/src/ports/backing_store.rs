use ahash::AHashMap;
use async_trait::async_trait;

use crate::model::{HoldingIdentity, SecureHash, StateDetails, StateRef, TransactionDetails, UniquenessCheckRequestInternal, UniquenessCheckResult};

use super::{common::SharedPortTraits, errors::BackingStoreError};

/// A decided request on its way to the store.
pub type TransactionOutcome<'a> = (&'a UniquenessCheckRequestInternal, &'a UniquenessCheckResult);

/// Persistence boundary of the uniqueness checker.
///
/// Implementations categorise every failure they raise (see [`super::errors::StorageErrorCategory`])
/// so the retry coordinator can decide between retrying and aborting without knowing anything
/// about the underlying engine.
#[async_trait]
pub trait BackingStore: SharedPortTraits + Send + Sync {
    /// Open a session scoped to one holding identity.
    async fn session(&self, holding_identity: &HoldingIdentity) -> Result<Box<dyn BackingStoreSession>, BackingStoreError>;
}

#[async_trait]
pub trait BackingStoreSession: Send {
    fn holding_identity(&self) -> &HoldingIdentity;

    /// Start a database transaction. Everything done through the returned handle is either
    /// committed together or not at all.
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn BackingStoreTransaction + 'a>, BackingStoreError>;
}

#[async_trait]
pub trait BackingStoreTransaction: Send {
    /// Bulk point lookup. Unknown ids are simply absent from the map.
    async fn get_transaction_details(&mut self, transaction_ids: &[SecureHash]) -> Result<AHashMap<SecureHash, TransactionDetails>, BackingStoreError>;

    /// Bulk point lookup. Unknown refs are simply absent from the map.
    async fn get_state_details(&mut self, state_refs: &[StateRef]) -> Result<AHashMap<StateRef, StateDetails>, BackingStoreError>;

    /// Insert unconsumed state rows. A row that already exists is a data related failure.
    async fn create_unconsumed_states(&mut self, state_refs: &[StateRef]) -> Result<(), BackingStoreError>;

    /// Conditionally mark states as consumed by `consuming_transaction_id`. A state is only
    /// updated while it is unconsumed; if any update touches zero rows the call fails with
    /// [`super::errors::BackingStoreErrorKind::InFlightConflict`].
    async fn consume_states(&mut self, consuming_transaction_id: &SecureHash, state_refs: &[StateRef]) -> Result<(), BackingStoreError>;

    /// Insert transaction rows, plus rejection details for every failed outcome.
    async fn commit_transactions<'o>(&mut self, outcomes: &[TransactionOutcome<'o>]) -> Result<(), BackingStoreError>;

    /// `false` once the transaction has been committed or rolled back.
    fn is_active(&self) -> bool;

    async fn commit(&mut self) -> Result<(), BackingStoreError>;

    async fn rollback(&mut self) -> Result<(), BackingStoreError>;
}
