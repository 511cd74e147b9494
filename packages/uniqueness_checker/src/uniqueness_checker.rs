use std::{sync::Arc, time::Duration};

use ahash::AHashMap;
use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

use crate::{
    checker::{BatchPartitioner, RequestNormalizer, RetryCoordinator, SubBatch, SubBatchOutcome},
    config::UniquenessCheckerConfig,
    core::{Clock, SystemClock},
    errors::UniquenessCheckerError,
    metrics::{MetricsSink, NoopMetricsSink},
    model::{OutcomeKind, UniquenessCheckError, UniquenessCheckRequest, UniquenessCheckResponse, UniquenessCheckResult},
    ports::BackingStore,
};

pub type UniquenessCheckResponses = AHashMap<UniquenessCheckRequest, UniquenessCheckResponse>;

/// Entry point of the engine. Successive calls are independent; nothing about a call is kept on
/// the checker.
pub struct UniquenessChecker {
    store: Arc<dyn BackingStore>,
    config: UniquenessCheckerConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl UniquenessChecker {
    pub fn new(store: Arc<dyn BackingStore>, config: UniquenessCheckerConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetricsSink),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &UniquenessCheckerConfig {
        &self.config
    }

    /// Decide every request and return exactly one response per distinct request. Responses are
    /// keyed by the request itself since processing order differs from submission order.
    pub async fn process_requests(&self, requests: &[UniquenessCheckRequest]) -> UniquenessCheckResponses {
        let mut responses = UniquenessCheckResponses::with_capacity(requests.len());
        self.metrics.record_batch_size(requests.len());

        let normalizer = RequestNormalizer::new(&self.config);
        let mut valid = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            match normalizer.normalize(request) {
                Ok(internal) => valid.push((index, internal)),
                Err(malformed) => {
                    info!("Rejecting malformed request {}: {}", request.transaction_id, malformed.error_text);
                    self.metrics.record_outcome(&request.holding_identity, OutcomeKind::MalformedRequest);
                    responses.insert(request.clone(), malformed.into_response(self.clock.now()));
                }
            }
        }

        let sub_batches = BatchPartitioner::partition(valid);
        info!(
            "Processing batch of {} requests in {} sub-batches ({} malformed)",
            requests.len(),
            sub_batches.len(),
            responses.len()
        );

        let deadline = self.config.call_timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let results = if self.config.parallel_partitions {
            join_all(sub_batches.iter().map(|sub_batch| self.run_sub_batch(sub_batch, deadline))).await
        } else {
            let mut results = Vec::with_capacity(sub_batches.len());
            for sub_batch in &sub_batches {
                results.push(self.run_sub_batch(sub_batch, deadline).await);
            }
            results
        };

        for (sub_batch, result) in sub_batches.iter().zip(results) {
            self.respond(requests, sub_batch, result, &mut responses);
        }

        responses
    }

    async fn run_sub_batch(&self, sub_batch: &SubBatch, deadline: Option<Instant>) -> Result<SubBatchOutcome, UniquenessCheckerError> {
        let coordinator = RetryCoordinator {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
            metrics: self.metrics.as_ref(),
            max_attempts: self.config.max_attempts,
            retry_backoff_ms: self.config.retry_backoff_ms,
        };

        let started = Instant::now();
        let result = match deadline {
            None => coordinator.run(sub_batch).await,
            // once the budget is spent the remaining sub-batches are not started at all
            Some(deadline) if Instant::now() >= deadline => Err(self.timeout_error()),
            Some(deadline) => timeout_at(deadline, coordinator.run(sub_batch))
                .await
                .unwrap_or_else(|_| Err(self.timeout_error())),
        };

        let attempts = match &result {
            Ok(outcome) => outcome.attempts,
            Err(e) => e.attempts,
        };
        self.metrics
            .record_sub_batch(&sub_batch.holding_identity, sub_batch.len(), started.elapsed(), attempts);

        result
    }

    fn timeout_error(&self) -> UniquenessCheckerError {
        UniquenessCheckerError::timeout(self.config.call_timeout_ms.unwrap_or_default())
    }

    fn respond(
        &self,
        requests: &[UniquenessCheckRequest],
        sub_batch: &SubBatch,
        result: Result<SubBatchOutcome, UniquenessCheckerError>,
        responses: &mut UniquenessCheckResponses,
    ) {
        let holding_identity = &sub_batch.holding_identity;

        match result {
            Ok(outcome) => {
                for ((index, request), decision) in sub_batch.requests.iter().zip(outcome.decisions) {
                    self.metrics.record_outcome(holding_identity, decision.outcome_kind());
                    responses.insert(
                        requests[*index].clone(),
                        UniquenessCheckResponse {
                            transaction_id: Some(request.transaction_id.clone()),
                            result: decision.result,
                        },
                    );
                }
            }
            Err(e) => {
                error!("Sub-batch of {} requests for {holding_identity} failed: {e}", sub_batch.len());
                let failure = UniquenessCheckError::UnhandledException {
                    exception_type: e.kind.to_string(),
                    exception_message: e.to_string(),
                };
                for (index, request) in &sub_batch.requests {
                    self.metrics.record_outcome(holding_identity, OutcomeKind::UnhandledException);
                    responses.insert(
                        requests[*index].clone(),
                        UniquenessCheckResponse {
                            transaction_id: Some(request.transaction_id.clone()),
                            result: UniquenessCheckResult::failure(self.clock.now(), failure.clone()),
                        },
                    );
                }
            }
        }
    }
}
