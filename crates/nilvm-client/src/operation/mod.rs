//! Client operations
//!
//! Every operation is described by a `*Config` value, validated by its
//! `build` method into an immutable operation, and run with
//! [`Operation::invoke`]. Priced operations obtain a fresh receipt on every
//! invocation.

pub mod compute;
pub mod permissions;
pub mod pool_status;
pub mod program;
pub mod state;
pub mod values;

use async_trait::async_trait;
use nilvm_core::Result;

pub use compute::{
    InvokeCompute, InvokeComputeConfig, RetrieveComputeResult, RetrieveComputeResultConfig,
};
pub use permissions::{
    OverwritePermissions, OverwritePermissionsConfig, RetrievePermissions,
    RetrievePermissionsConfig, UpdatePermissions, UpdatePermissionsConfig,
};
pub use pool_status::{QueryPoolStatus, QueryPoolStatusConfig};
pub use program::{StoreProgram, StoreProgramConfig, MAX_PROGRAM_NAME_LEN};
pub use state::{Lifecycle, OperationState};
pub use values::{
    DeleteValues, DeleteValuesConfig, RetrieveValues, RetrieveValuesConfig, StoreValues,
    StoreValuesConfig,
};

/// A built, ready to run operation
#[async_trait]
pub trait Operation: Send + Sync {
    /// Result of a successful invocation
    type Output: Send;

    /// Operation name used in logs
    fn name(&self) -> &'static str;

    /// Pay (when priced), call every node and reduce the replies
    async fn invoke(&self) -> Result<Self::Output>;
}
