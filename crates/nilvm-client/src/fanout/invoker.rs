//! Single-node invocation

use super::requests::PerNodeRequest;
use async_trait::async_trait;
use nilvm_core::Result;

/// Performs one network call against one node and maps the reply
///
/// Implementations return transport failures as
/// [`nilvm_core::NilError::Transport`] untouched; whether to retry is decided
/// by the caller's retry policy.
#[async_trait]
pub trait NodeInvoker<R: Send + Sync>: Send + Sync {
    /// Logical result produced by one node
    type Output: Send;

    /// Call the node addressed by `request`
    async fn invoke(&self, request: &PerNodeRequest<R>) -> Result<Self::Output>;
}
