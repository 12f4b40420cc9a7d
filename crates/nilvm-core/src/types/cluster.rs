//! Cluster membership as published by the bootnode

use crate::{NilError, PartyId, Result};
use serde::{Deserialize, Serialize};

/// Prime modulus the cluster computes over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prime {
    /// 64-bit safe prime
    Safe64Bits,
    /// 128-bit safe prime
    Safe128Bits,
    /// 256-bit safe prime
    Safe256Bits,
}

/// One member of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Party identity
    pub identity: PartyId,
    /// Endpoint serving the node's RPCs
    pub grpc_endpoint: String,
    /// Node's ed25519 public key
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
}

/// The set of nodes that jointly hold every share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// All members, leader included
    pub members: Vec<ClusterMember>,
    /// Member handling payments and leader-only queries
    pub leader: ClusterMember,
    /// Prime modulus
    pub prime: Prime,
    /// Degree of the sharing polynomial
    pub polynomial_degree: u32,
    /// Statistical security parameter
    pub kappa: u32,
}

impl Cluster {
    /// Check the membership is usable: non-empty, unique identities, and a
    /// leader drawn from the members
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(NilError::invalid("cluster has no members"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for member in &self.members {
            if !seen.insert(member.identity) {
                return Err(NilError::invalid(format!(
                    "duplicate cluster member {}",
                    member.identity
                )));
            }
        }
        if !seen.contains(&self.leader.identity) {
            return Err(NilError::invalid(format!(
                "leader {} is not a cluster member",
                self.leader.identity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u8) -> ClusterMember {
        ClusterMember {
            identity: PartyId::from_bytes([n; 32]),
            grpc_endpoint: format!("http://node-{n}:14311"),
            public_key: vec![n; 32],
        }
    }

    fn cluster(members: Vec<ClusterMember>, leader: ClusterMember) -> Cluster {
        Cluster {
            members,
            leader,
            prime: Prime::Safe64Bits,
            polynomial_degree: 1,
            kappa: 0,
        }
    }

    #[test]
    fn valid_cluster() {
        assert!(cluster(vec![member(1), member(2), member(3)], member(1))
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_empty_duplicate_and_foreign_leader() {
        assert!(cluster(vec![], member(1)).validate().is_err());
        assert!(cluster(vec![member(1), member(1)], member(1))
            .validate()
            .is_err());
        assert!(cluster(vec![member(1), member(2)], member(9))
            .validate()
            .is_err());
    }
}
