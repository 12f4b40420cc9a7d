//! # nilVM Client
//!
//! Client for a secret-sharing cluster. Values are masked into one share set
//! per node, every operation is paid for through the cluster leader, and
//! each request is fanned out to all nodes concurrently. Node calls are
//! retried independently and the replies must agree before a result is
//! returned.
//!
//! ```ignore
//! let client = VmClientBuilder::new(config, transports, maskers, signer, broadcaster)
//!     .build()
//!     .await?;
//! let id = client
//!     .store_values()
//!     .ttl(1)
//!     .value("foo", NadaValue::SecretInteger(42))
//!     .build(&client)?
//!     .invoke()
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod cluster;
pub mod fanout;
pub mod operation;
pub mod payment;
pub mod transport;

pub use auth::{SignedToken, Token, TokenAuthManager, AUTH_HEADER};
pub use client::{VmClient, VmClientBuilder, VmClientConfig};
pub use cluster::{ClusterNode, TransportFactory};
pub use fanout::{collapse, Coordinator, NodeInvoker, PerNodeRequest};
pub use operation::{Operation, OperationState};
pub use payment::{PaymentClient, PaymentClientBuilder, PaymentClientConfig, SignerChain};
pub use transport::{HttpTransport, HttpTransportFactory};
