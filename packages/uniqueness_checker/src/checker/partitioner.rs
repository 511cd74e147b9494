use ahash::AHashMap;
use rand::seq::SliceRandom;

use crate::model::{HoldingIdentity, UniquenessCheckRequestInternal};

/// The requests of one holding identity within a call. Each request keeps the position it had in
/// the caller's batch so its response can be routed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBatch {
    pub holding_identity: HoldingIdentity,
    pub requests: Vec<(usize, UniquenessCheckRequestInternal)>,
}

impl SubBatch {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

pub struct BatchPartitioner;

impl BatchPartitioner {
    /// Group requests by holding identity and shuffle the groups so no identity is always
    /// processed first. Submission order is kept within a group.
    pub fn partition(requests: Vec<(usize, UniquenessCheckRequestInternal)>) -> Vec<SubBatch> {
        let mut sub_batches = Self::group(requests);
        sub_batches.shuffle(&mut rand::rng());
        sub_batches
    }

    fn group(requests: Vec<(usize, UniquenessCheckRequestInternal)>) -> Vec<SubBatch> {
        let mut positions: AHashMap<HoldingIdentity, usize> = AHashMap::new();
        let mut sub_batches: Vec<SubBatch> = Vec::new();

        for (index, request) in requests {
            let position = *positions.entry(request.holding_identity.clone()).or_insert_with(|| {
                sub_batches.push(SubBatch {
                    holding_identity: request.holding_identity.clone(),
                    requests: Vec::new(),
                });
                sub_batches.len() - 1
            });
            sub_batches[position].requests.push((index, request));
        }

        sub_batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        checker::normalizer::RequestNormalizer,
        config::UniquenessCheckerConfig,
        test_helpers::requests::{alice, bob, tx_id, RequestBuilder},
    };

    fn internal(n: u32, holding_identity: HoldingIdentity) -> UniquenessCheckRequestInternal {
        let request = RequestBuilder::write(&tx_id(n)).holding_identity(holding_identity).build();
        RequestNormalizer::new(&UniquenessCheckerConfig::default()).normalize(&request).unwrap()
    }

    #[test]
    fn groups_by_holding_identity_keeping_submission_order() {
        let requests = vec![(0, internal(1, alice())), (1, internal(2, bob())), (2, internal(3, alice())), (3, internal(4, bob()))];

        let mut sub_batches = BatchPartitioner::partition(requests);
        sub_batches.sort_by(|a, b| a.holding_identity.x500_name.cmp(&b.holding_identity.x500_name));

        assert_eq!(sub_batches.len(), 2);
        assert_eq!(sub_batches[0].holding_identity, alice());
        assert_eq!(sub_batches[0].requests.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(sub_batches[1].holding_identity, bob());
        assert_eq!(sub_batches[1].requests.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(sub_batches[1].requests[1].1.transaction_id.to_string(), tx_id(4));
    }

    #[test]
    fn group_order_is_randomised() {
        let identities: Vec<HoldingIdentity> = (0..8).map(|n| HoldingIdentity::new(format!("O=Party{n}, L=London, C=GB"), "group")).collect();
        let requests: Vec<_> = identities.iter().enumerate().map(|(i, hi)| (i, internal(i as u32, hi.clone()))).collect();

        // 8! orderings, so 20 identical draws in a row will not happen by chance
        let first = BatchPartitioner::partition(requests.clone());
        let all_same = (0..20).all(|_| BatchPartitioner::partition(requests.clone()) == first);
        assert!(!all_same);
    }

    #[test]
    fn empty_batch_has_no_sub_batches() {
        assert!(BatchPartitioner::partition(vec![]).is_empty());
    }
}
