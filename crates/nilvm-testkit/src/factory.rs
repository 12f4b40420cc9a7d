//! Transport factory resolving endpoints to in-memory nodes

use crate::node::MockNode;
use nilvm_client::{TokenAuthManager, TransportFactory};
use nilvm_core::effects::NodeTransport;
use nilvm_core::{ClusterMember, NilError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out [`MockNode`]s by endpoint
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    nodes: HashMap<String, Arc<MockNode>>,
    connected: Mutex<Vec<String>>,
}

impl MockTransportFactory {
    /// Empty factory
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `endpoint` with `node`
    pub fn with_node(mut self, endpoint: impl Into<String>, node: Arc<MockNode>) -> Self {
        self.nodes.insert(endpoint.into(), node);
        self
    }

    /// Endpoints connected to so far, bootnode included
    pub fn connected(&self) -> Vec<String> {
        self.connected.lock().clone()
    }

    fn resolve(&self, endpoint: &str) -> Result<Arc<MockNode>> {
        self.connected.lock().push(endpoint.to_string());
        self.nodes
            .get(endpoint)
            .cloned()
            .ok_or_else(|| NilError::invalid(format!("no node serves {endpoint}")))
    }
}

impl TransportFactory for MockTransportFactory {
    fn bootnode(&self, url: &str) -> Result<Arc<dyn NodeTransport>> {
        Ok(self.resolve(url)?)
    }

    fn connect(
        &self,
        member: &ClusterMember,
        auth: Arc<TokenAuthManager>,
    ) -> Result<Arc<dyn NodeTransport>> {
        let node = self.resolve(&member.grpc_endpoint)?;
        node.set_caller(auth.user_id());
        Ok(node)
    }
}
