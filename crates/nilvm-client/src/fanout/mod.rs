//! Multi-node execution engine
//!
//! - [`requests`] builds one request per node (uniform or sharded)
//! - [`invoker`] performs a single node call
//! - [`coordinator`] fans calls out under the retry policy and collapses the
//!   replies

pub mod coordinator;
pub mod invoker;
pub mod requests;

pub use coordinator::{collapse, Coordinator};
pub use invoker::NodeInvoker;
pub use requests::PerNodeRequest;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cluster::ClusterNode;
    use async_trait::async_trait;
    use nilvm_core::effects::rpc::*;
    use nilvm_core::messages::*;
    use nilvm_core::types::*;
    use nilvm_core::{NetworkFailure, TransportError};
    use std::sync::Arc;

    pub(crate) fn party(n: u8) -> PartyId {
        PartyId::from_bytes([n; 32])
    }

    /// Nodes whose transport is never reached by the test
    pub(crate) fn nodes(ids: &[u8]) -> Vec<ClusterNode> {
        ids.iter()
            .map(|n| ClusterNode::new(party(*n), Arc::new(Unreachable)))
            .collect()
    }

    struct Unreachable;

    fn down<T>() -> RpcResult<T> {
        Err(TransportError::network(
            NetworkFailure::ConnectionRefused,
            "unreachable",
        ))
    }

    #[async_trait]
    impl ValuesRpc for Unreachable {
        async fn store_values(&self, _: &StoreValuesRequest) -> RpcResult<StoreValuesResponse> {
            down()
        }

        async fn retrieve_values(
            &self,
            _: &RetrieveValuesRequest,
        ) -> RpcResult<RetrieveValuesResponse> {
            down()
        }

        async fn delete_values(&self, _: &DeleteValuesRequest) -> RpcResult<()> {
            down()
        }
    }

    #[async_trait]
    impl ComputeRpc for Unreachable {
        async fn invoke_compute(
            &self,
            _: &InvokeComputeRequest,
        ) -> RpcResult<InvokeComputeResponse> {
            down()
        }

        async fn retrieve_results(
            &self,
            _: &RetrieveResultsRequest,
        ) -> RpcResult<ComputeResultStream> {
            down()
        }
    }

    #[async_trait]
    impl PermissionsRpc for Unreachable {
        async fn retrieve_permissions(
            &self,
            _: &RetrievePermissionsRequest,
        ) -> RpcResult<ValuesPermissions> {
            down()
        }

        async fn update_permissions(&self, _: &UpdatePermissionsRequest) -> RpcResult<()> {
            down()
        }

        async fn overwrite_permissions(&self, _: &OverwritePermissionsRequest) -> RpcResult<()> {
            down()
        }
    }

    #[async_trait]
    impl ProgramsRpc for Unreachable {
        async fn store_program(&self, _: &StoreProgramRequest) -> RpcResult<StoreProgramResponse> {
            down()
        }
    }

    #[async_trait]
    impl LeaderQueriesRpc for Unreachable {
        async fn pool_status(&self, _: &PoolStatusRequest) -> RpcResult<PoolStatusResponse> {
            down()
        }
    }

    #[async_trait]
    impl PaymentsRpc for Unreachable {
        async fn price_quote(&self, _: &PriceQuoteRequest) -> RpcResult<SignedQuote> {
            down()
        }

        async fn payment_receipt(&self, _: &PaymentReceiptRequest) -> RpcResult<SignedReceipt> {
            down()
        }

        async fn account_balance(&self) -> RpcResult<AccountBalance> {
            down()
        }

        async fn payments_config(&self) -> RpcResult<PaymentsConfig> {
            down()
        }

        async fn add_funds(&self, _: &AddFundsRequest) -> RpcResult<()> {
            down()
        }
    }

    #[async_trait]
    impl MembershipRpc for Unreachable {
        async fn cluster(&self) -> RpcResult<Cluster> {
            down()
        }
    }
}
