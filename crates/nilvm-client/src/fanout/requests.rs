//! Per-node request construction
//!
//! A request is either *uniform*, where every node receives the same payload,
//! or *sharded*, where each node receives the share set addressed to its own
//! party id. Sharded construction matches shares to nodes before anything is
//! sent, so a mismatch never reaches the network.

use crate::cluster::ClusterNode;
use nilvm_core::{EncodedValues, NilError, PartyId, PartyShares, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The request sent to one node during a fan-out
#[derive(Debug)]
pub struct PerNodeRequest<R> {
    /// Target node
    pub node: ClusterNode,
    /// Payload for that node
    pub payload: Arc<R>,
}

impl<R> Clone for PerNodeRequest<R> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<R> PerNodeRequest<R> {
    /// Party id of the target node
    pub fn party(&self) -> PartyId {
        self.node.id
    }

    /// One request shared by every node
    pub fn uniform(nodes: &[ClusterNode], payload: R) -> Vec<Self> {
        let payload = Arc::new(payload);
        nodes
            .iter()
            .map(|node| Self {
                node: node.clone(),
                payload: Arc::clone(&payload),
            })
            .collect()
    }

    /// One request per node, built from the share addressed to it
    ///
    /// Fails with [`NilError::UnmatchedParty`] if a share names a party that
    /// is not a configured node, or a node has no share.
    pub fn sharded<F>(
        nodes: &[ClusterNode],
        shares: Vec<PartyShares>,
        mut build: F,
    ) -> Result<Vec<Self>>
    where
        F: FnMut(EncodedValues) -> R,
    {
        let mut by_party: BTreeMap<PartyId, EncodedValues> = BTreeMap::new();
        for share in shares {
            if by_party.insert(share.party, share.shares).is_some() {
                return Err(NilError::masking(format!(
                    "masker produced more than one share set for party {}",
                    share.party
                )));
            }
        }

        let known: BTreeMap<PartyId, &ClusterNode> =
            nodes.iter().map(|node| (node.id, node)).collect();
        if let Some(party) = by_party.keys().find(|party| !known.contains_key(party)) {
            return Err(NilError::UnmatchedParty { party: *party });
        }

        nodes
            .iter()
            .map(|node| {
                let share = by_party
                    .remove(&node.id)
                    .ok_or(NilError::UnmatchedParty { party: node.id })?;
                Ok(Self {
                    node: node.clone(),
                    payload: Arc::new(build(share)),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::test_support::{nodes, party};
    use assert_matches::assert_matches;

    fn share(n: u8) -> PartyShares {
        PartyShares {
            party: party(n),
            shares: EncodedValues(vec![n]),
        }
    }

    #[test]
    fn uniform_shares_one_payload() {
        let requests = PerNodeRequest::uniform(&nodes(&[1, 2, 3]), "payload".to_string());
        assert_eq!(requests.len(), 3);
        assert!(Arc::ptr_eq(&requests[0].payload, &requests[2].payload));
    }

    #[test]
    fn sharded_matches_shares_in_any_order() {
        let requests =
            PerNodeRequest::sharded(&nodes(&[1, 2, 3]), vec![share(3), share(1), share(2)], |s| s)
                .unwrap();
        for request in &requests {
            assert_eq!(request.payload.0, vec![request.party().as_bytes()[0]]);
        }
    }

    #[test]
    fn foreign_share_is_unmatched() {
        let result =
            PerNodeRequest::sharded(&nodes(&[1, 2, 3]), vec![share(1), share(2), share(9)], |s| s);
        assert_matches!(result, Err(NilError::UnmatchedParty { party: p }) if p == party(9));
    }

    #[test]
    fn node_without_share_is_unmatched() {
        let result = PerNodeRequest::sharded(&nodes(&[1, 2, 3]), vec![share(1), share(2)], |s| s);
        assert_matches!(result, Err(NilError::UnmatchedParty { party: p }) if p == party(3));
    }

    #[test]
    fn duplicate_share_is_rejected() {
        let result =
            PerNodeRequest::sharded(&nodes(&[1, 2]), vec![share(1), share(1), share(2)], |s| s);
        assert_matches!(result, Err(NilError::Masking { .. }));
    }
}
