use ahash::AHashMap;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    core::Clock,
    model::{
        OutcomeKind, SecureHash, StateDetails, StateRef, TransactionDetails, UniquenessCheckError, UniquenessCheckRequestInternal, UniquenessCheckResult,
    },
};

/// Transaction and state rows known to one attempt of one sub-batch. Seeded from the store at the
/// start of the attempt and updated as requests are decided, so later requests in the same
/// sub-batch see the effect of earlier ones. Never outlives the attempt.
#[derive(Debug, Default)]
pub struct DecisionCaches {
    transactions: AHashMap<SecureHash, UniquenessCheckResult>,
    states: AHashMap<StateRef, StateDetails>,
}

impl DecisionCaches {
    pub fn seed(transactions: AHashMap<SecureHash, TransactionDetails>, states: AHashMap<StateRef, StateDetails>) -> Self {
        Self {
            transactions: transactions.into_iter().map(|(id, details)| (id, details.result)).collect(),
            states,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    /// The transaction already has a stored (or earlier in this sub-batch) result.
    Duplicate,
    /// A fresh WRITE decision that must be stored.
    Committable,
    /// A READ answer. Nothing is stored.
    ReadOnly,
}

/// State mutations owed by an accepted WRITE request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateWrites {
    pub create: Vec<StateRef>,
    pub consume: Vec<StateRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDecision {
    pub result: UniquenessCheckResult,
    pub kind: DecisionKind,
    /// Only set for accepted WRITE requests.
    pub state_writes: Option<StateWrites>,
}

impl RequestDecision {
    fn new(result: UniquenessCheckResult, kind: DecisionKind) -> Self {
        Self {
            result,
            kind,
            state_writes: None,
        }
    }

    pub fn outcome_kind(&self) -> OutcomeKind {
        match self.kind {
            DecisionKind::Duplicate => OutcomeKind::Duplicate,
            DecisionKind::Committable | DecisionKind::ReadOnly => self.result.outcome_kind(),
        }
    }

    pub fn is_committable(&self) -> bool {
        self.kind == DecisionKind::Committable
    }
}

/// Decides requests of one sub-batch against the attempt's caches.
pub struct ConflictDetector<'c> {
    clock: &'c dyn Clock,
}

impl<'c> ConflictDetector<'c> {
    pub fn new(clock: &'c dyn Clock) -> Self {
        Self { clock }
    }

    pub fn decide(&self, request: &UniquenessCheckRequestInternal, caches: &mut DecisionCaches) -> RequestDecision {
        let decision = if request.is_write() {
            self.decide_write(request, caches)
        } else {
            self.decide_read(request, caches)
        };

        debug!(
            "Decided transaction {} of {} as {} ({:?})",
            request.transaction_id,
            request.holding_identity,
            decision.outcome_kind(),
            decision.kind
        );
        decision
    }

    fn decide_write(&self, request: &UniquenessCheckRequestInternal, caches: &mut DecisionCaches) -> RequestDecision {
        if let Some(result) = caches.transactions.get(&request.transaction_id) {
            return RequestDecision::new(result.clone(), DecisionKind::Duplicate);
        }

        let now = self.clock.now();
        let result = match self.check_write(request, caches, now) {
            Err(error) => UniquenessCheckResult::failure(now, error),
            Ok(()) => UniquenessCheckResult::success(now),
        };
        caches.transactions.insert(request.transaction_id.clone(), result.clone());

        if !result.is_success() {
            return RequestDecision::new(result, DecisionKind::Committable);
        }

        let state_writes = Self::accept(request, caches);
        RequestDecision {
            result,
            kind: DecisionKind::Committable,
            state_writes: Some(state_writes),
        }
    }

    /// Checks run in a fixed order and the first failure is the only one reported.
    fn check_write(&self, request: &UniquenessCheckRequestInternal, caches: &DecisionCaches, now: OffsetDateTime) -> Result<(), UniquenessCheckError> {
        let unknown_inputs = unknown_states(&request.input_states, caches);
        if !unknown_inputs.is_empty() {
            return Err(UniquenessCheckError::InputStateUnknown { unknown_states: unknown_inputs });
        }

        let unknown_references = unknown_states(&request.reference_states, caches);
        if !unknown_references.is_empty() {
            return Err(UniquenessCheckError::ReferenceStateUnknown {
                unknown_states: unknown_references,
            });
        }

        let input_conflicts = conflicting_states(&request.input_states, &request.transaction_id, caches);
        if !input_conflicts.is_empty() {
            return Err(UniquenessCheckError::InputStateConflict {
                conflicting_states: input_conflicts,
            });
        }

        let reference_conflicts = conflicting_states(&request.reference_states, &request.transaction_id, caches);
        if !reference_conflicts.is_empty() {
            return Err(UniquenessCheckError::ReferenceStateConflict {
                conflicting_states: reference_conflicts,
            });
        }

        if !is_within_time_window(request, now) {
            return Err(UniquenessCheckError::TimeWindowOutOfBounds {
                evaluation_timestamp: now,
                lower_bound: request.time_window_lower_bound,
                upper_bound: request.time_window_upper_bound,
            });
        }

        Ok(())
    }

    /// Reflect an accepted request in the caches and work out which rows it has to write. States
    /// already created or consumed by this same transaction are left alone.
    fn accept(request: &UniquenessCheckRequestInternal, caches: &mut DecisionCaches) -> StateWrites {
        let mut state_writes = StateWrites::default();

        for output in request.output_states() {
            if !caches.states.contains_key(&output) {
                caches.states.insert(output.clone(), StateDetails::unconsumed(output.clone()));
                state_writes.create.push(output);
            }
        }

        for input in &request.input_states {
            if let Some(details) = caches.states.get_mut(input) {
                if details.consuming_transaction_id.is_none() {
                    details.consuming_transaction_id = Some(request.transaction_id.clone());
                    state_writes.consume.push(input.clone());
                }
            }
        }

        state_writes
    }

    fn decide_read(&self, request: &UniquenessCheckRequestInternal, caches: &DecisionCaches) -> RequestDecision {
        if let Some(result) = caches.transactions.get(&request.transaction_id) {
            return RequestDecision::new(result.clone(), DecisionKind::ReadOnly);
        }

        let now = self.clock.now();
        let error = match request.time_window_lower_bound {
            Some(lower_bound) if lower_bound > now => UniquenessCheckError::TimeWindowBeforeLowerBound {
                evaluation_timestamp: now,
                lower_bound,
            },
            _ if !is_within_time_window(request, now) => UniquenessCheckError::TimeWindowOutOfBounds {
                evaluation_timestamp: now,
                lower_bound: request.time_window_lower_bound,
                upper_bound: request.time_window_upper_bound,
            },
            _ => UniquenessCheckError::NotPreviouslySeenTransaction,
        };

        RequestDecision::new(UniquenessCheckResult::failure(now, error), DecisionKind::ReadOnly)
    }
}

fn unknown_states(state_refs: &[StateRef], caches: &DecisionCaches) -> Vec<StateRef> {
    state_refs.iter().filter(|state_ref| !caches.states.contains_key(*state_ref)).cloned().collect()
}

/// States consumed by some other transaction. A state consumed by `transaction_id` itself is not
/// a conflict.
fn conflicting_states(state_refs: &[StateRef], transaction_id: &SecureHash, caches: &DecisionCaches) -> Vec<StateDetails> {
    state_refs
        .iter()
        .filter_map(|state_ref| caches.states.get(state_ref))
        .filter(|details| matches!(&details.consuming_transaction_id, Some(consumer) if consumer != transaction_id))
        .cloned()
        .collect()
}

/// `[lower, upper)`. A missing lower bound is open; a missing upper bound (READ only) is open too.
fn is_within_time_window(request: &UniquenessCheckRequestInternal, now: OffsetDateTime) -> bool {
    let after_lower = request.time_window_lower_bound.map_or(true, |lower| lower <= now);
    let before_upper = request.time_window_upper_bound.map_or(true, |upper| now < upper);
    after_lower && before_upper
}
