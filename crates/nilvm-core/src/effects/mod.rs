//! Effect interfaces
//!
//! Capabilities the client depends on but does not implement itself: node
//! RPCs, secret masking, payment chain access and retry policy.

pub mod chain;
pub mod masking;
pub mod reliability;
pub mod rpc;

pub use chain::{Broadcaster, ChainAccount, ChainMessage, PaymentChain, SignDoc, SignedTx, Signer};
pub use masking::{MaskerFactory, SecretMasker};
pub use reliability::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
pub use rpc::{
    ComputeResultStream, ComputeRpc, LeaderQueriesRpc, MembershipRpc, NodeTransport,
    PaymentsRpc, PermissionsRpc, ProgramsRpc, RpcResult, ValuesRpc,
};
