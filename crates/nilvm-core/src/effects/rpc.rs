//! Node RPC effect traits
//!
//! One trait per service family exposed by a cluster node. A transport for a
//! single node implements all of them and is used through [`NodeTransport`].
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `nilvm-client` (HTTP transport), `nilvm-testkit` (mocks)
//! - **Usage**: operation invokers and the payment client
//!
//! Implementations report failures as [`TransportError`] and never decide
//! whether a failure is worth retrying.

use crate::errors::TransportError;
use crate::messages::{
    AddFundsRequest, ComputeResultState, DeleteValuesRequest, InvokeComputeRequest,
    InvokeComputeResponse, OverwritePermissionsRequest, PaymentReceiptRequest, PoolStatusRequest,
    PoolStatusResponse, RetrievePermissionsRequest, RetrieveResultsRequest,
    RetrieveValuesRequest, RetrieveValuesResponse, StoreProgramRequest, StoreProgramResponse,
    StoreValuesRequest, StoreValuesResponse, UpdatePermissionsRequest,
};
use crate::types::{
    AccountBalance, Cluster, PaymentsConfig, PriceQuoteRequest, SignedQuote, SignedReceipt,
    ValuesPermissions,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Result type of a single node call
pub type RpcResult<T> = Result<T, TransportError>;

/// Server stream of compute result states
pub type ComputeResultStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = RpcResult<ComputeResultState>> + Send>>;

/// Values service
#[async_trait]
pub trait ValuesRpc: Send + Sync {
    /// Store this node's shares
    async fn store_values(&self, request: &StoreValuesRequest) -> RpcResult<StoreValuesResponse>;

    /// Fetch this node's shares
    async fn retrieve_values(
        &self,
        request: &RetrieveValuesRequest,
    ) -> RpcResult<RetrieveValuesResponse>;

    /// Delete stored values
    async fn delete_values(&self, request: &DeleteValuesRequest) -> RpcResult<()>;
}

/// Compute service
#[async_trait]
pub trait ComputeRpc: Send + Sync {
    /// Start a computation
    async fn invoke_compute(
        &self,
        request: &InvokeComputeRequest,
    ) -> RpcResult<InvokeComputeResponse>;

    /// Follow a computation until it produces a result
    async fn retrieve_results(
        &self,
        request: &RetrieveResultsRequest,
    ) -> RpcResult<ComputeResultStream>;
}

/// Permissions service
#[async_trait]
pub trait PermissionsRpc: Send + Sync {
    /// Read permissions
    async fn retrieve_permissions(
        &self,
        request: &RetrievePermissionsRequest,
    ) -> RpcResult<ValuesPermissions>;

    /// Amend permissions
    async fn update_permissions(&self, request: &UpdatePermissionsRequest) -> RpcResult<()>;

    /// Replace permissions
    async fn overwrite_permissions(&self, request: &OverwritePermissionsRequest)
        -> RpcResult<()>;
}

/// Programs service
#[async_trait]
pub trait ProgramsRpc: Send + Sync {
    /// Upload a program
    async fn store_program(&self, request: &StoreProgramRequest)
        -> RpcResult<StoreProgramResponse>;
}

/// Queries answered by the leader only
#[async_trait]
pub trait LeaderQueriesRpc: Send + Sync {
    /// Preprocessing pool status
    async fn pool_status(&self, request: &PoolStatusRequest) -> RpcResult<PoolStatusResponse>;
}

/// Payments service, answered by the leader
#[async_trait]
pub trait PaymentsRpc: Send + Sync {
    /// Price an operation
    async fn price_quote(&self, request: &PriceQuoteRequest) -> RpcResult<SignedQuote>;

    /// Settle a quote and obtain a receipt
    async fn payment_receipt(&self, request: &PaymentReceiptRequest) -> RpcResult<SignedReceipt>;

    /// Current prepaid balance of the caller
    async fn account_balance(&self) -> RpcResult<AccountBalance>;

    /// Payment parameters
    async fn payments_config(&self) -> RpcResult<PaymentsConfig>;

    /// Credit the caller's balance with an on-chain payment
    async fn add_funds(&self, request: &AddFundsRequest) -> RpcResult<()>;
}

/// Membership service, answered by every node including the bootnode
#[async_trait]
pub trait MembershipRpc: Send + Sync {
    /// Current cluster definition
    async fn cluster(&self) -> RpcResult<Cluster>;
}

/// Every RPC a single node serves
pub trait NodeTransport:
    ValuesRpc
    + ComputeRpc
    + PermissionsRpc
    + ProgramsRpc
    + LeaderQueriesRpc
    + PaymentsRpc
    + MembershipRpc
{
}

impl<T> NodeTransport for T where
    T: ValuesRpc
        + ComputeRpc
        + PermissionsRpc
        + ProgramsRpc
        + LeaderQueriesRpc
        + PaymentsRpc
        + MembershipRpc
        + ?Sized
{
}

#[async_trait]
impl<T: ValuesRpc + ?Sized> ValuesRpc for Arc<T> {
    async fn store_values(&self, request: &StoreValuesRequest) -> RpcResult<StoreValuesResponse> {
        (**self).store_values(request).await
    }

    async fn retrieve_values(
        &self,
        request: &RetrieveValuesRequest,
    ) -> RpcResult<RetrieveValuesResponse> {
        (**self).retrieve_values(request).await
    }

    async fn delete_values(&self, request: &DeleteValuesRequest) -> RpcResult<()> {
        (**self).delete_values(request).await
    }
}

#[async_trait]
impl<T: ComputeRpc + ?Sized> ComputeRpc for Arc<T> {
    async fn invoke_compute(
        &self,
        request: &InvokeComputeRequest,
    ) -> RpcResult<InvokeComputeResponse> {
        (**self).invoke_compute(request).await
    }

    async fn retrieve_results(
        &self,
        request: &RetrieveResultsRequest,
    ) -> RpcResult<ComputeResultStream> {
        (**self).retrieve_results(request).await
    }
}

#[async_trait]
impl<T: PermissionsRpc + ?Sized> PermissionsRpc for Arc<T> {
    async fn retrieve_permissions(
        &self,
        request: &RetrievePermissionsRequest,
    ) -> RpcResult<ValuesPermissions> {
        (**self).retrieve_permissions(request).await
    }

    async fn update_permissions(&self, request: &UpdatePermissionsRequest) -> RpcResult<()> {
        (**self).update_permissions(request).await
    }

    async fn overwrite_permissions(
        &self,
        request: &OverwritePermissionsRequest,
    ) -> RpcResult<()> {
        (**self).overwrite_permissions(request).await
    }
}

#[async_trait]
impl<T: ProgramsRpc + ?Sized> ProgramsRpc for Arc<T> {
    async fn store_program(
        &self,
        request: &StoreProgramRequest,
    ) -> RpcResult<StoreProgramResponse> {
        (**self).store_program(request).await
    }
}

#[async_trait]
impl<T: LeaderQueriesRpc + ?Sized> LeaderQueriesRpc for Arc<T> {
    async fn pool_status(&self, request: &PoolStatusRequest) -> RpcResult<PoolStatusResponse> {
        (**self).pool_status(request).await
    }
}

#[async_trait]
impl<T: PaymentsRpc + ?Sized> PaymentsRpc for Arc<T> {
    async fn price_quote(&self, request: &PriceQuoteRequest) -> RpcResult<SignedQuote> {
        (**self).price_quote(request).await
    }

    async fn payment_receipt(&self, request: &PaymentReceiptRequest) -> RpcResult<SignedReceipt> {
        (**self).payment_receipt(request).await
    }

    async fn account_balance(&self) -> RpcResult<AccountBalance> {
        (**self).account_balance().await
    }

    async fn payments_config(&self) -> RpcResult<PaymentsConfig> {
        (**self).payments_config().await
    }

    async fn add_funds(&self, request: &AddFundsRequest) -> RpcResult<()> {
        (**self).add_funds(request).await
    }
}

#[async_trait]
impl<T: MembershipRpc + ?Sized> MembershipRpc for Arc<T> {
    async fn cluster(&self) -> RpcResult<Cluster> {
        (**self).cluster().await
    }
}
