//! Preprocessing pool status, answered by the leader

use super::state::{Lifecycle, OperationState};
use super::Operation;
use crate::client::VmClient;
use crate::fanout::{Coordinator, NodeInvoker, PerNodeRequest};
use async_trait::async_trait;
use nilvm_core::effects::LeaderQueriesRpc;
use nilvm_core::messages::{PoolStatusRequest, PoolStatusResponse};
use nilvm_core::{PriceQuoteRequest, Result};
use std::sync::Arc;

const QUERY_POOL_STATUS: &str = "query_pool_status";

/// Pool status query; takes no parameters
#[derive(Debug, Clone, Default)]
pub struct QueryPoolStatusConfig;

impl QueryPoolStatusConfig {
    /// Build the query
    pub fn build(self, client: &VmClient) -> Result<QueryPoolStatus> {
        Ok(QueryPoolStatus {
            client: client.clone(),
        })
    }
}

/// Asks the leader for the state of the preprocessing pool
#[derive(Debug)]
pub struct QueryPoolStatus {
    client: VmClient,
}

impl QueryPoolStatus {
    async fn run(&self, lifecycle: &mut Lifecycle) -> Result<PoolStatusResponse> {
        lifecycle.advance(OperationState::Paying);
        let receipt = self
            .client
            .payer()
            .pay_for_operation(PriceQuoteRequest::PoolStatus)
            .await?;

        lifecycle.advance(OperationState::Requesting);
        let requests = PerNodeRequest::uniform(
            std::slice::from_ref(self.client.leader()),
            PoolStatusRequest {
                signed_receipt: Arc::new(receipt),
            },
        );
        Coordinator::new(QUERY_POOL_STATUS, self.client.retry_policy())
            .execute(&PoolStatusInvoker, &requests, lifecycle)
            .await
    }
}

#[async_trait]
impl Operation for QueryPoolStatus {
    type Output = PoolStatusResponse;

    fn name(&self) -> &'static str {
        QUERY_POOL_STATUS
    }

    async fn invoke(&self) -> Result<PoolStatusResponse> {
        let mut lifecycle = Lifecycle::new(QUERY_POOL_STATUS);
        let outcome = self.run(&mut lifecycle).await;
        lifecycle.finish(outcome)
    }
}

struct PoolStatusInvoker;

#[async_trait]
impl NodeInvoker<PoolStatusRequest> for PoolStatusInvoker {
    type Output = PoolStatusResponse;

    async fn invoke(
        &self,
        request: &PerNodeRequest<PoolStatusRequest>,
    ) -> Result<PoolStatusResponse> {
        let status = request.node.transport.pool_status(&request.payload).await?;
        tracing::debug!(
            node = %request.party(),
            offsets = status.offsets.len(),
            active = status.preprocessing_active,
            "Pool status"
        );
        Ok(status)
    }
}
