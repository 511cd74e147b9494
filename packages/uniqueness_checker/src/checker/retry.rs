use std::time::Duration;

use ahash::AHashSet;
use tracing::{debug, error, warn};

use crate::{
    core::Clock,
    errors::UniquenessCheckerError,
    metrics::MetricsSink,
    model::UniquenessCheckRequestInternal,
    ports::{
        errors::{BackingStoreError, StorageErrorCategory},
        BackingStore, BackingStoreSession, BackingStoreTransaction,
    },
};

use super::{
    committer::ResultCommitter,
    detector::{ConflictDetector, DecisionCaches, RequestDecision},
    partitioner::SubBatch,
};

const MAX_BACKOFF_MS: u64 = 1_000;

/// Decisions of a sub-batch that was durably committed, one per request in sub-batch order.
#[derive(Debug)]
pub struct SubBatchOutcome {
    pub decisions: Vec<RequestDecision>,
    pub attempts: u32,
}

/// Runs the decide and commit cycle of one sub-batch inside a store transaction, retrying on
/// transient and data related storage failures.
pub struct RetryCoordinator<'a> {
    pub store: &'a dyn BackingStore,
    pub clock: &'a dyn Clock,
    pub metrics: &'a dyn MetricsSink,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl RetryCoordinator<'_> {
    pub async fn run(&self, sub_batch: &SubBatch) -> Result<SubBatchOutcome, UniquenessCheckerError> {
        let holding_identity = &sub_batch.holding_identity;
        let max_attempts = self.max_attempts.max(1);
        let mut session: Option<Box<dyn BackingStoreSession>> = None;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let result = match session.as_mut() {
                Some(session) => self.attempt(&mut **session, sub_batch).await,
                None => match self.store.session(holding_identity).await {
                    Ok(opened) => self.attempt(&mut **session.insert(opened), sub_batch).await,
                    Err(e) => Err(e),
                },
            };

            let error = match result {
                Ok(decisions) => {
                    if attempt > 1 {
                        debug!("Sub-batch of {holding_identity} committed on attempt {attempt}");
                    }
                    return Ok(SubBatchOutcome { decisions, attempts: attempt });
                }
                Err(error) => error,
            };

            self.metrics.record_storage_error(holding_identity, error.category);

            match error.category {
                StorageErrorCategory::Fatal => {
                    error!("Fatal storage error for {holding_identity} on attempt {attempt}, aborting sub-batch: {error}");
                    return Err(UniquenessCheckerError::from_storage_error(error, attempt));
                }
                StorageErrorCategory::Uncategorized => {
                    warn!("Uncategorized storage error for {holding_identity} on attempt {attempt}, not retrying: {error}");
                    return Err(UniquenessCheckerError::from_storage_error(error, attempt));
                }
                StorageErrorCategory::Transient => {
                    // the connection may be gone, start the next attempt on a fresh session
                    session = None;
                }
                StorageErrorCategory::DataRelated => {}
            }

            warn!(
                "Attempt {attempt}/{max_attempts} for {holding_identity} failed with {} error: {error}",
                error.category
            );

            if attempt < max_attempts {
                let backoff = self.backoff(attempt);
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            last_error = Some(error);
        }

        Err(UniquenessCheckerError::retries_exhausted(max_attempts, last_error))
    }

    /// `retry_backoff_ms * 2^(attempt-1)`, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }

    async fn attempt(&self, session: &mut (dyn BackingStoreSession + '_), sub_batch: &SubBatch) -> Result<Vec<RequestDecision>, BackingStoreError> {
        let mut transaction = session.begin().await?;

        match self.decide_and_commit(&mut *transaction, sub_batch).await {
            Ok(decisions) => Ok(decisions),
            Err(error) => {
                if transaction.is_active() {
                    if let Err(rollback_error) = transaction.rollback().await {
                        warn!("Rollback for {} failed: {rollback_error}", sub_batch.holding_identity);
                    }
                }
                Err(error)
            }
        }
    }

    async fn decide_and_commit(
        &self,
        transaction: &mut (dyn BackingStoreTransaction + '_),
        sub_batch: &SubBatch,
    ) -> Result<Vec<RequestDecision>, BackingStoreError> {
        let requests: Vec<&UniquenessCheckRequestInternal> = sub_batch.requests.iter().map(|(_, request)| request).collect();

        let transaction_ids = distinct(requests.iter().map(|request| &request.transaction_id));
        let state_refs = distinct(requests.iter().flat_map(|request| request.input_states.iter().chain(&request.reference_states)));

        let transaction_details = transaction.get_transaction_details(&transaction_ids).await?;
        let state_details = if state_refs.is_empty() {
            Default::default()
        } else {
            transaction.get_state_details(&state_refs).await?
        };

        let mut caches = DecisionCaches::seed(transaction_details, state_details);
        let detector = ConflictDetector::new(self.clock);
        let decisions: Vec<RequestDecision> = requests.iter().map(|request| detector.decide(request, &mut caches)).collect();

        ResultCommitter::commit(&mut *transaction, &requests, &decisions).await?;
        transaction.commit().await?;

        Ok(decisions)
    }
}

fn distinct<'r, T: Clone + Eq + std::hash::Hash + 'r>(items: impl Iterator<Item = &'r T>) -> Vec<T> {
    let mut seen = AHashSet::new();
    items.filter(|item| seen.insert(*item)).cloned().collect()
}
