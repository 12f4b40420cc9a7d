//! nilVM Testing Infrastructure
//!
//! In-memory stand-ins for everything the client talks to: cluster nodes,
//! the payment chain with its signer and broadcaster, and a deterministic
//! masker. [`TestCluster`] assembles them into a connected [`VmClient`].

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```rust,no_run
//! use nilvm_testkit::*;
//! use nilvm_client::Operation;
//! use nilvm_core::NadaValue;
//!
//! # async fn example() -> nilvm_core::Result<()> {
//! let cluster = TestCluster::new();
//! let client = &cluster.client;
//! let id = client
//!     .store_values()
//!     .ttl(1)
//!     .value("foo", NadaValue::SecretInteger(42))
//!     .build(client)?
//!     .invoke()
//!     .await?;
//! assert!(cluster.node(2).stored_values(id).is_some());
//! # Ok(())
//! # }
//! ```
//!
//! [`VmClient`]: nilvm_client::VmClient

pub mod chain;
pub mod factory;
pub mod fixtures;
pub mod masker;
pub mod node;

pub use chain::{test_address, MockBroadcaster, MockChain, MockSigner};
pub use factory::MockTransportFactory;
pub use fixtures::{
    init_tracing, party, test_user, TestCluster, TestClusterBuilder, DEFAULT_TEST_BALANCE,
    TEST_BOOTNODE_URL, TEST_USER_SEED,
};
pub use masker::{MockMasker, MockMaskerFactory};
pub use node::{
    MockNode, QuoteBehavior, ResultBehavior, DEFAULT_MINIMUM_ADD_FUNDS, DEFAULT_QUOTE_TOTAL,
};
