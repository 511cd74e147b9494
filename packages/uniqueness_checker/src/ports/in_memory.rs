use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use crate::model::{HoldingIdentity, SecureHash, StateDetails, StateRef, TransactionDetails, UniquenessCheckError, UniquenessCheckResult};

use super::{
    backing_store::{BackingStore, BackingStoreSession, BackingStoreTransaction, TransactionOutcome},
    common::SharedPortTraits,
    errors::{BackingStoreError, BackingStoreErrorKind, StorageErrorCategory},
};

#[derive(Debug, Clone)]
struct TransactionRow {
    originator_x500_name: String,
    expiry: Option<OffsetDateTime>,
    commit_timestamp: OffsetDateTime,
    accepted: bool,
}

/// The three tables of one holding identity.
#[derive(Debug, Clone, Default)]
struct PartitionTables {
    transactions: AHashMap<SecureHash, TransactionRow>,
    rejections: AHashMap<SecureHash, UniquenessCheckError>,
    states: AHashMap<StateRef, Option<SecureHash>>,
}

#[derive(Debug)]
enum PendingWrite {
    Transaction {
        transaction_id: SecureHash,
        row: TransactionRow,
        rejection: Option<UniquenessCheckError>,
    },
    CreateState(StateRef),
    ConsumeState {
        consuming_transaction_id: SecureHash,
        state_ref: StateRef,
    },
}

impl PartitionTables {
    /// Apply one write with the same guarantees a relational store gives: unique keys and the
    /// conditional "only while unconsumed" update.
    fn apply(&mut self, write: &PendingWrite) -> Result<(), BackingStoreError> {
        match write {
            PendingWrite::Transaction { transaction_id, row, rejection } => {
                if self.transactions.contains_key(transaction_id) {
                    return Err(BackingStoreError::new(
                        BackingStoreErrorKind::CommitTransactions,
                        StorageErrorCategory::DataRelated,
                        "duplicate key value violates unique constraint on transaction details",
                    )
                    .with_data(transaction_id.to_string()));
                }
                self.transactions.insert(transaction_id.clone(), row.clone());
                if let Some(error) = rejection {
                    self.rejections.insert(transaction_id.clone(), error.clone());
                }
            }
            PendingWrite::CreateState(state_ref) => {
                if self.states.contains_key(state_ref) {
                    return Err(BackingStoreError::new(
                        BackingStoreErrorKind::CreateStates,
                        StorageErrorCategory::DataRelated,
                        "duplicate key value violates unique constraint on state details",
                    )
                    .with_data(state_ref.to_string()));
                }
                self.states.insert(state_ref.clone(), None);
            }
            PendingWrite::ConsumeState {
                consuming_transaction_id,
                state_ref,
            } => match self.states.get_mut(state_ref) {
                Some(consumer @ None) => *consumer = Some(consuming_transaction_id.clone()),
                _ => return Err(BackingStoreError::in_flight_conflict(consuming_transaction_id, state_ref)),
            },
        }
        Ok(())
    }

    fn transaction_details(&self, transaction_id: &SecureHash) -> Result<Option<TransactionDetails>, BackingStoreError> {
        let Some(row) = self.transactions.get(transaction_id) else {
            return Ok(None);
        };

        let result = if row.accepted {
            UniquenessCheckResult::success(row.commit_timestamp)
        } else {
            let error = self
                .rejections
                .get(transaction_id)
                .ok_or_else(|| BackingStoreError::missing_rejection_details(transaction_id))?;
            UniquenessCheckResult::failure(row.commit_timestamp, error.clone())
        };

        Ok(Some(TransactionDetails {
            transaction_id: transaction_id.clone(),
            originator_x500_name: row.originator_x500_name.clone(),
            expiry: row.expiry,
            result,
        }))
    }
}

/// Consumption by a competing transaction, committed just ahead of the next commit of a partition.
#[derive(Debug)]
struct RivalCommit {
    consuming_transaction_id: SecureHash,
    state_refs: Vec<StateRef>,
}

#[derive(Debug, Default)]
struct StoreData {
    partitions: AHashMap<HoldingIdentity, PartitionTables>,
    injected_failures: AHashMap<HoldingIdentity, VecDeque<BackingStoreError>>,
    rival_commits: AHashMap<HoldingIdentity, VecDeque<RivalCommit>>,
    transactions_begun: AHashMap<HoldingIdentity, u32>,
}

impl StoreData {
    /// Apply a transaction's writes to the committed tables of a partition, all or nothing.
    fn commit_writes(&mut self, holding_identity: &HoldingIdentity, writes: &[PendingWrite]) -> Result<(), BackingStoreError> {
        let mut tables = self.partitions.get(holding_identity).cloned().unwrap_or_default();
        for write in writes {
            tables.apply(write)?;
        }
        self.partitions.insert(holding_identity.clone(), tables);
        Ok(())
    }

    fn commit_rival(&mut self, holding_identity: &HoldingIdentity) {
        let Some(rival) = self.rival_commits.get_mut(holding_identity).and_then(VecDeque::pop_front) else {
            return;
        };

        let writes: Vec<PendingWrite> = rival
            .state_refs
            .into_iter()
            .map(|state_ref| PendingWrite::ConsumeState {
                consuming_transaction_id: rival.consuming_transaction_id.clone(),
                state_ref,
            })
            .collect();
        match self.commit_writes(holding_identity, &writes) {
            Ok(()) => debug!("Rival transaction {} committed for {holding_identity}", rival.consuming_transaction_id),
            Err(e) => debug!("Rival transaction {} for {holding_identity} did not commit: {e}", rival.consuming_transaction_id),
        }
    }
}

/// Backing store kept in process memory.
///
/// Writes are buffered per transaction and applied atomically on commit, re-checking unique keys
/// and the conditional consume against whatever other transactions committed in the meantime.
/// Failures can be injected per holding identity: each queued error fails one transaction attempt
/// on its first operation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackingStore {
    data: Arc<Mutex<StoreData>>,
    closed: Arc<AtomicBool>,
}

fn lock(data: &Mutex<StoreData>) -> Result<MutexGuard<'_, StoreData>, BackingStoreError> {
    data.lock()
        .map_err(|_| BackingStoreError::new(BackingStoreErrorKind::Session, StorageErrorCategory::Fatal, "in-memory store lock poisoned"))
}

impl InMemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failures(&self, holding_identity: &HoldingIdentity, failures: Vec<BackingStoreError>) {
        if let Ok(mut data) = self.data.lock() {
            data.injected_failures.entry(holding_identity.clone()).or_default().extend(failures);
        }
    }

    /// Just before the next commit for `holding_identity`, another transaction consuming `state_refs`
    /// commits first, as if it had raced past the same reads.
    pub fn race_next_commit(&self, holding_identity: &HoldingIdentity, consuming_transaction_id: SecureHash, state_refs: Vec<StateRef>) {
        if let Ok(mut data) = self.data.lock() {
            data.rival_commits.entry(holding_identity.clone()).or_default().push_back(RivalCommit {
                consuming_transaction_id,
                state_refs,
            });
        }
    }

    pub fn transaction_details(&self, holding_identity: &HoldingIdentity, transaction_id: &SecureHash) -> Option<TransactionDetails> {
        let data = self.data.lock().ok()?;
        data.partitions.get(holding_identity)?.transaction_details(transaction_id).ok().flatten()
    }

    pub fn state_details(&self, holding_identity: &HoldingIdentity, state_ref: &StateRef) -> Option<StateDetails> {
        let data = self.data.lock().ok()?;
        let consumer = data.partitions.get(holding_identity)?.states.get(state_ref)?;
        Some(StateDetails {
            state_ref: state_ref.clone(),
            consuming_transaction_id: consumer.clone(),
        })
    }

    pub fn transaction_count(&self, holding_identity: &HoldingIdentity) -> usize {
        self.data
            .lock()
            .ok()
            .and_then(|data| data.partitions.get(holding_identity).map(|tables| tables.transactions.len()))
            .unwrap_or_default()
    }

    pub fn state_count(&self, holding_identity: &HoldingIdentity) -> usize {
        self.data
            .lock()
            .ok()
            .and_then(|data| data.partitions.get(holding_identity).map(|tables| tables.states.len()))
            .unwrap_or_default()
    }

    /// Number of store transactions started for the holding identity, i.e. attempts.
    pub fn transactions_begun(&self, holding_identity: &HoldingIdentity) -> u32 {
        self.data
            .lock()
            .ok()
            .and_then(|data| data.transactions_begun.get(holding_identity).copied())
            .unwrap_or_default()
    }

    /// Drops the rejection details of a failed transaction, leaving a corrupt `Failure` row behind.
    pub fn remove_rejection_details(&self, holding_identity: &HoldingIdentity, transaction_id: &SecureHash) -> bool {
        let Ok(mut data) = self.data.lock() else {
            return false;
        };
        data.partitions
            .get_mut(holding_identity)
            .map(|tables| tables.rejections.remove(transaction_id).is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn session(&self, holding_identity: &HoldingIdentity) -> Result<Box<dyn BackingStoreSession>, BackingStoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackingStoreError::new(
                BackingStoreErrorKind::Session,
                StorageErrorCategory::Fatal,
                "in-memory store has been shut down",
            ));
        }

        Ok(Box::new(InMemorySession {
            store: self.clone(),
            holding_identity: holding_identity.clone(),
        }))
    }
}

#[async_trait]
impl SharedPortTraits for InMemoryBackingStore {
    async fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn shutdown(&self) -> bool {
        self.closed.store(true, Ordering::Release);
        true
    }
}

struct InMemorySession {
    store: InMemoryBackingStore,
    holding_identity: HoldingIdentity,
}

#[async_trait]
impl BackingStoreSession for InMemorySession {
    fn holding_identity(&self) -> &HoldingIdentity {
        &self.holding_identity
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn BackingStoreTransaction + 'a>, BackingStoreError> {
        if self.store.closed.load(Ordering::Acquire) {
            return Err(BackingStoreError::new(
                BackingStoreErrorKind::Begin,
                StorageErrorCategory::Fatal,
                "in-memory store has been shut down",
            ));
        }

        let injected_failure = {
            let mut data = lock(&self.store.data)?;
            *data.transactions_begun.entry(self.holding_identity.clone()).or_default() += 1;
            data.injected_failures.get_mut(&self.holding_identity).and_then(|failures| failures.pop_front())
        };

        Ok(Box::new(InMemoryTransaction {
            data: Arc::clone(&self.store.data),
            holding_identity: &self.holding_identity,
            pending: Vec::new(),
            overlay: None,
            injected_failure,
            active: true,
        }))
    }
}

struct InMemoryTransaction<'a> {
    data: Arc<Mutex<StoreData>>,
    holding_identity: &'a HoldingIdentity,
    pending: Vec<PendingWrite>,
    /// The partition as this transaction first saw it, with its own writes applied.
    overlay: Option<PartitionTables>,
    injected_failure: Option<BackingStoreError>,
    active: bool,
}

impl InMemoryTransaction<'_> {
    fn ensure_usable(&mut self) -> Result<(), BackingStoreError> {
        if !self.active {
            return Err(BackingStoreError::new(
                BackingStoreErrorKind::Session,
                StorageErrorCategory::Fatal,
                "transaction is no longer active",
            ));
        }
        match self.injected_failure.take() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Seeded from the committed tables on first use. Commits by other transactions after that are
    /// only seen again when this transaction commits.
    fn overlay(&mut self) -> Result<&mut PartitionTables, BackingStoreError> {
        let overlay = match self.overlay.take() {
            Some(overlay) => overlay,
            None => lock(&self.data)?.partitions.get(self.holding_identity).cloned().unwrap_or_default(),
        };
        Ok(self.overlay.insert(overlay))
    }

    fn queue(&mut self, write: PendingWrite) -> Result<(), BackingStoreError> {
        self.overlay()?.apply(&write)?;
        self.pending.push(write);
        Ok(())
    }
}

#[async_trait]
impl BackingStoreTransaction for InMemoryTransaction<'_> {
    async fn get_transaction_details(&mut self, transaction_ids: &[SecureHash]) -> Result<AHashMap<SecureHash, TransactionDetails>, BackingStoreError> {
        self.ensure_usable()?;
        let tables = self.overlay()?;

        let mut found = AHashMap::with_capacity(transaction_ids.len());
        for transaction_id in transaction_ids {
            if let Some(details) = tables.transaction_details(transaction_id)? {
                found.insert(transaction_id.clone(), details);
            }
        }
        Ok(found)
    }

    async fn get_state_details(&mut self, state_refs: &[StateRef]) -> Result<AHashMap<StateRef, StateDetails>, BackingStoreError> {
        self.ensure_usable()?;
        let tables = self.overlay()?;

        Ok(state_refs
            .iter()
            .filter_map(|state_ref| {
                let consumer = tables.states.get(state_ref)?;
                let details = StateDetails {
                    state_ref: state_ref.clone(),
                    consuming_transaction_id: consumer.clone(),
                };
                Some((state_ref.clone(), details))
            })
            .collect())
    }

    async fn create_unconsumed_states(&mut self, state_refs: &[StateRef]) -> Result<(), BackingStoreError> {
        self.ensure_usable()?;
        for state_ref in state_refs {
            self.queue(PendingWrite::CreateState(state_ref.clone()))?;
        }
        Ok(())
    }

    async fn consume_states(&mut self, consuming_transaction_id: &SecureHash, state_refs: &[StateRef]) -> Result<(), BackingStoreError> {
        self.ensure_usable()?;
        for state_ref in state_refs {
            self.queue(PendingWrite::ConsumeState {
                consuming_transaction_id: consuming_transaction_id.clone(),
                state_ref: state_ref.clone(),
            })?;
        }
        Ok(())
    }

    async fn commit_transactions<'o>(&mut self, outcomes: &[TransactionOutcome<'o>]) -> Result<(), BackingStoreError> {
        self.ensure_usable()?;
        for (request, result) in outcomes {
            self.queue(PendingWrite::Transaction {
                transaction_id: request.transaction_id.clone(),
                row: TransactionRow {
                    originator_x500_name: request.originator_x500_name.clone(),
                    expiry: request.time_window_upper_bound,
                    commit_timestamp: result.commit_timestamp(),
                    accepted: result.is_success(),
                },
                rejection: result.error().cloned(),
            })?;
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn commit(&mut self) -> Result<(), BackingStoreError> {
        self.ensure_usable()?;
        self.active = false;

        let mut data = lock(&self.data)?;
        data.commit_rival(self.holding_identity);

        // Other transactions may have committed since these writes were queued.
        data.commit_writes(self.holding_identity, &self.pending).map_err(|e| BackingStoreError {
            reason: format!("Commit failed - {}", e.reason),
            ..e
        })?;
        debug!("Committed {} writes for {}", self.pending.len(), self.holding_identity);
        self.pending.clear();
        self.overlay = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BackingStoreError> {
        if !self.active {
            return Err(BackingStoreError::new(
                BackingStoreErrorKind::Rollback,
                StorageErrorCategory::Fatal,
                "transaction is no longer active",
            ));
        }
        self.active = false;
        self.pending.clear();
        self.overlay = None;
        Ok(())
    }
}
