use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use uniqueness_common_utils::otel::metric_constants::{
    METRIC_KEY_ERROR_CATEGORY, METRIC_KEY_HOLDING_IDENTITY, METRIC_KEY_OUTCOME, METRIC_METER_NAME_UNIQUENESS_CHECKER, METRIC_NAME_BATCH_SIZE,
    METRIC_NAME_OUTCOME_COUNT, METRIC_NAME_STORAGE_ERROR_COUNT, METRIC_NAME_SUB_BATCH_ATTEMPTS, METRIC_NAME_SUB_BATCH_DURATION, METRIC_NAME_SUB_BATCH_SIZE,
};

use crate::{model::HoldingIdentity, model::OutcomeKind, ports::errors::StorageErrorCategory};

/// Where the checker reports what it did. Recording never fails and never blocks the caller.
#[cfg_attr(test, automock)]
pub trait MetricsSink: Send + Sync {
    /// Number of requests handed to one `process_requests` call.
    fn record_batch_size(&self, size: usize);
    /// One sub-batch finished, successfully or not, after `attempts` attempts.
    fn record_sub_batch(&self, holding_identity: &HoldingIdentity, size: usize, duration: Duration, attempts: u32);
    fn record_outcome(&self, holding_identity: &HoldingIdentity, outcome: OutcomeKind);
    fn record_storage_error(&self, holding_identity: &HoldingIdentity, category: StorageErrorCategory);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record_batch_size(&self, _size: usize) {}
    fn record_sub_batch(&self, _holding_identity: &HoldingIdentity, _size: usize, _duration: Duration, _attempts: u32) {}
    fn record_outcome(&self, _holding_identity: &HoldingIdentity, _outcome: OutcomeKind) {}
    fn record_storage_error(&self, _holding_identity: &HoldingIdentity, _category: StorageErrorCategory) {}
}

/// Sink backed by the global OpenTelemetry meter provider. Install a provider first with
/// `uniqueness_common_utils::otel::initialiser::init_otel_metrics`, otherwise the instruments are no-ops.
pub struct OtelMetricsSink {
    batch_size: Histogram<u64>,
    sub_batch_size: Histogram<u64>,
    sub_batch_duration: Histogram<f64>,
    sub_batch_attempts: Histogram<u64>,
    outcomes: Counter<u64>,
    storage_errors: Counter<u64>,
}

impl Default for OtelMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OtelMetricsSink {
    pub fn new() -> Self {
        let meter = global::meter(METRIC_METER_NAME_UNIQUENESS_CHECKER);
        let batch_size = meter.u64_histogram(METRIC_NAME_BATCH_SIZE).with_unit("tx").build();
        let sub_batch_size = meter.u64_histogram(METRIC_NAME_SUB_BATCH_SIZE).with_unit("tx").build();
        let sub_batch_duration = meter.f64_histogram(METRIC_NAME_SUB_BATCH_DURATION).with_unit("ms").build();
        let sub_batch_attempts = meter.u64_histogram(METRIC_NAME_SUB_BATCH_ATTEMPTS).with_unit("attempts").build();
        let outcomes = meter.u64_counter(METRIC_NAME_OUTCOME_COUNT).with_unit("tx").build();
        let storage_errors = meter.u64_counter(METRIC_NAME_STORAGE_ERROR_COUNT).with_unit("errors").build();

        storage_errors.add(0, &[]);

        Self {
            batch_size,
            sub_batch_size,
            sub_batch_duration,
            sub_batch_attempts,
            outcomes,
            storage_errors,
        }
    }
}

impl MetricsSink for OtelMetricsSink {
    fn record_batch_size(&self, size: usize) {
        self.batch_size.record(size as u64, &[]);
    }

    fn record_sub_batch(&self, holding_identity: &HoldingIdentity, size: usize, duration: Duration, attempts: u32) {
        let attributes = [KeyValue::new(METRIC_KEY_HOLDING_IDENTITY, holding_identity.to_string())];
        self.sub_batch_size.record(size as u64, &attributes);
        self.sub_batch_duration.record(duration.as_secs_f64() * 1_000_f64, &attributes);
        self.sub_batch_attempts.record(attempts as u64, &attributes);
    }

    fn record_outcome(&self, holding_identity: &HoldingIdentity, outcome: OutcomeKind) {
        self.outcomes.add(
            1,
            &[
                KeyValue::new(METRIC_KEY_HOLDING_IDENTITY, holding_identity.to_string()),
                KeyValue::new(METRIC_KEY_OUTCOME, outcome.to_string()),
            ],
        );
    }

    fn record_storage_error(&self, holding_identity: &HoldingIdentity, category: StorageErrorCategory) {
        self.storage_errors.add(
            1,
            &[
                KeyValue::new(METRIC_KEY_HOLDING_IDENTITY, holding_identity.to_string()),
                KeyValue::new(METRIC_KEY_ERROR_CATEGORY, category.to_string()),
            ],
        );
    }
}
