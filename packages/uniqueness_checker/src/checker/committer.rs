use crate::{
    model::UniquenessCheckRequestInternal,
    ports::{errors::BackingStoreError, BackingStoreTransaction, TransactionOutcome},
};

use super::detector::RequestDecision;

pub struct ResultCommitter;

impl ResultCommitter {
    /// Write the decided sub-batch through `transaction`. Transaction rows go first, then the
    /// state rows of every accepted request in submission order. Nothing is committed here; the
    /// caller commits or rolls back the store transaction.
    pub async fn commit(
        transaction: &mut (dyn BackingStoreTransaction + '_),
        requests: &[&UniquenessCheckRequestInternal],
        decisions: &[RequestDecision],
    ) -> Result<(), BackingStoreError> {
        let outcomes: Vec<TransactionOutcome<'_>> = requests
            .iter()
            .zip(decisions)
            .filter(|(_, decision)| decision.is_committable())
            .map(|(request, decision)| (*request, &decision.result))
            .collect();

        if outcomes.is_empty() {
            return Ok(());
        }
        transaction.commit_transactions(&outcomes).await?;

        for (request, decision) in requests.iter().zip(decisions) {
            let Some(state_writes) = decision.state_writes.as_ref().filter(|_| decision.is_committable()) else {
                continue;
            };

            if !state_writes.create.is_empty() {
                transaction.create_unconsumed_states(&state_writes.create).await?;
            }
            if !state_writes.consume.is_empty() {
                transaction.consume_states(&request.transaction_id, &state_writes.consume).await?;
            }
        }

        Ok(())
    }
}
