//! Cluster nodes as seen by a client session

use crate::auth::TokenAuthManager;
use nilvm_core::effects::NodeTransport;
use nilvm_core::{ClusterMember, PartyId, Result};
use std::fmt;
use std::sync::Arc;

/// One node of the cluster together with the transport used to reach it
#[derive(Clone)]
pub struct ClusterNode {
    /// Party identity of the node
    pub id: PartyId,
    /// Transport bound to this node
    pub transport: Arc<dyn NodeTransport>,
}

impl ClusterNode {
    /// Pair an identity with its transport
    pub fn new(id: PartyId, transport: Arc<dyn NodeTransport>) -> Self {
        Self { id, transport }
    }
}

impl fmt::Debug for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterNode").field("id", &self.id).finish()
    }
}

/// Builds transports for cluster members
pub trait TransportFactory: Send + Sync {
    /// Transport used to discover the cluster
    fn bootnode(&self, url: &str) -> Result<Arc<dyn NodeTransport>>;

    /// Transport bound to one member, authenticating as `auth`
    fn connect(
        &self,
        member: &ClusterMember,
        auth: Arc<TokenAuthManager>,
    ) -> Result<Arc<dyn NodeTransport>>;
}
