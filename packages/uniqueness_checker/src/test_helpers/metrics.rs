use std::{sync::Mutex, time::Duration};

use crate::{
    metrics::MetricsSink,
    model::{HoldingIdentity, OutcomeKind},
    ports::errors::StorageErrorCategory,
};

#[derive(Default)]
struct Recorded {
    batch_sizes: Vec<usize>,
    sub_batches: Vec<(HoldingIdentity, usize, u32)>,
    outcomes: Vec<(HoldingIdentity, OutcomeKind)>,
    storage_errors: Vec<(HoldingIdentity, StorageErrorCategory)>,
}

/// Sink that keeps everything it is given, for assertions across many calls.
#[derive(Default)]
pub struct RecordingMetricsSink {
    recorded: Mutex<Recorded>,
}

impl RecordingMetricsSink {
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.recorded.lock().unwrap().batch_sizes.clone()
    }

    /// `(size, attempts)` of every sub-batch of `holding_identity`, in completion order.
    pub fn sub_batches(&self, holding_identity: &HoldingIdentity) -> Vec<(usize, u32)> {
        let recorded = self.recorded.lock().unwrap();
        recorded
            .sub_batches
            .iter()
            .filter(|(hi, ..)| hi == holding_identity)
            .map(|(_, size, attempts)| (*size, *attempts))
            .collect()
    }

    pub fn outcomes(&self, holding_identity: &HoldingIdentity) -> Vec<OutcomeKind> {
        let recorded = self.recorded.lock().unwrap();
        recorded.outcomes.iter().filter(|(hi, _)| hi == holding_identity).map(|(_, kind)| *kind).collect()
    }

    pub fn storage_errors(&self, holding_identity: &HoldingIdentity) -> Vec<StorageErrorCategory> {
        let recorded = self.recorded.lock().unwrap();
        recorded
            .storage_errors
            .iter()
            .filter(|(hi, _)| hi == holding_identity)
            .map(|(_, category)| *category)
            .collect()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_batch_size(&self, size: usize) {
        self.recorded.lock().unwrap().batch_sizes.push(size);
    }

    fn record_sub_batch(&self, holding_identity: &HoldingIdentity, size: usize, _duration: Duration, attempts: u32) {
        self.recorded.lock().unwrap().sub_batches.push((holding_identity.clone(), size, attempts));
    }

    fn record_outcome(&self, holding_identity: &HoldingIdentity, outcome: OutcomeKind) {
        self.recorded.lock().unwrap().outcomes.push((holding_identity.clone(), outcome));
    }

    fn record_storage_error(&self, holding_identity: &HoldingIdentity, category: StorageErrorCategory) {
        self.recorded.lock().unwrap().storage_errors.push((holding_identity.clone(), category));
    }
}
