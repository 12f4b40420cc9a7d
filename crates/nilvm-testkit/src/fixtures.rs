//! Ready-made clusters for client tests
//!
//! [`TestCluster`] wires a [`VmClient`] to in-memory nodes: node 1 leads and
//! settles payments, every node shares one [`MockChain`], and the masker
//! splits values across all members.

use crate::chain::{test_address, MockBroadcaster, MockChain, MockSigner};
use crate::factory::MockTransportFactory;
use crate::masker::{MockMasker, MockMaskerFactory};
use crate::node::MockNode;
use ed25519_dalek::VerifyingKey;
use nilvm_client::{
    ClusterNode, PaymentClient, PaymentClientConfig, SignerChain, TokenAuthManager, VmClient,
    VmClientBuilder, VmClientConfig,
};
use nilvm_core::effects::{NodeTransport, RetryPolicy};
use nilvm_core::{
    ClientConfig, Cluster, ClusterMember, PartyId, PaymentMode, Prime, UserId,
};
use std::sync::Arc;

/// Seed of the user every fixture authenticates as
pub const TEST_USER_SEED: &str = "nilvm-test-user";

/// Bootnode URL served by [`TestCluster::transport_factory`]
pub const TEST_BOOTNODE_URL: &str = "http://bootnode:43207";

/// Balance the leader starts with unless told otherwise
pub const DEFAULT_TEST_BALANCE: u64 = 1_000_000;

/// Party identity `n` repeated over every byte
pub fn party(n: u8) -> PartyId {
    PartyId::from_bytes([n; 32])
}

/// User the fixtures authenticate as
pub fn test_user() -> UserId {
    TokenAuthManager::from_seed(TEST_USER_SEED).user_id()
}

/// Install a test subscriber honouring `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn endpoint(n: u8) -> String {
    format!("http://node-{n}:14311")
}

/// Options for a [`TestCluster`]
#[derive(Debug, Clone)]
pub struct TestClusterBuilder {
    size: u8,
    payment_mode: PaymentMode,
    balance: u64,
    foreign_party: Option<PartyId>,
    retry: RetryPolicy,
}

impl Default for TestClusterBuilder {
    fn default() -> Self {
        Self {
            size: 3,
            payment_mode: PaymentMode::FromBalance,
            balance: DEFAULT_TEST_BALANCE,
            foreign_party: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl TestClusterBuilder {
    /// Number of nodes, leader included
    pub fn size(mut self, size: u8) -> Self {
        self.size = size;
        self
    }

    /// Settle payments with `mode`
    pub fn payment_mode(mut self, mode: PaymentMode) -> Self {
        self.payment_mode = mode;
        self
    }

    /// Prepaid balance held by the leader
    pub fn balance(mut self, balance: u64) -> Self {
        self.balance = balance;
        self
    }

    /// Have the masker address the last share to `party`
    pub fn foreign_party(mut self, party: PartyId) -> Self {
        self.foreign_party = Some(party);
        self
    }

    /// Retry policy for node calls
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Assemble the nodes and the client
    pub fn build(self) -> TestCluster {
        assert!(self.size > 0, "a cluster needs at least one node");
        let user = test_user();
        let chain = Arc::new(MockChain::new());
        let nodes: Vec<Arc<MockNode>> = (1..=self.size)
            .map(|n| {
                let node = MockNode::new(party(n)).with_chain(Arc::clone(&chain));
                node.set_caller(user);
                Arc::new(node)
            })
            .collect();
        nodes[0].set_balance(self.balance);

        let cluster_nodes: Vec<ClusterNode> = nodes
            .iter()
            .map(|node| {
                let transport: Arc<dyn NodeTransport> = node.clone();
                ClusterNode::new(node.identity(), transport)
            })
            .collect();
        let leader = cluster_nodes[0].clone();

        let mut masker = MockMasker::new(nodes.iter().map(|node| node.identity()).collect());
        if let Some(foreign) = self.foreign_party {
            masker = masker.with_foreign_party(foreign);
        }

        let signer = Arc::new(MockSigner::new());
        let broadcaster = Arc::new(MockBroadcaster::new(Arc::clone(&chain)));
        let leader_key = VerifyingKey::from_bytes(
            &nodes[0]
                .public_key()
                .try_into()
                .expect("ed25519 public keys are 32 bytes"),
        )
        .expect("leader key is valid");
        let payer = PaymentClient::new(PaymentClientConfig {
            user_id: user,
            address: test_address(),
            chain: Arc::new(SignerChain::new(signer, broadcaster, test_address())),
            leader: Arc::clone(&leader.transport),
            payment_mode: self.payment_mode,
            leader_public_key: Some(leader_key),
        });

        let client = VmClient::new(VmClientConfig {
            user_id: user,
            payer,
            masker: Arc::new(masker),
            leader,
            nodes: cluster_nodes,
            retry: self.retry,
        })
        .expect("fixture node set is valid");

        TestCluster {
            nodes,
            chain,
            client,
            user,
        }
    }
}

/// In-memory cluster with a client connected to it
#[derive(Debug)]
pub struct TestCluster {
    /// Nodes in party order; the first one leads
    pub nodes: Vec<Arc<MockNode>>,
    /// Chain shared by every node
    pub chain: Arc<MockChain>,
    /// Client talking to the nodes
    pub client: VmClient,
    /// User the client authenticates as
    pub user: UserId,
}

impl TestCluster {
    /// Options for a new cluster
    pub fn builder() -> TestClusterBuilder {
        TestClusterBuilder::default()
    }

    /// Three nodes, drawing payments from a funded balance
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// The leader node
    pub fn leader(&self) -> &Arc<MockNode> {
        &self.nodes[0]
    }

    /// Node with party `n`, counting from 1
    pub fn node(&self, n: u8) -> &Arc<MockNode> {
        &self.nodes[usize::from(n) - 1]
    }

    /// Total calls to `method` across all nodes
    pub fn calls(&self, method: &str) -> usize {
        self.nodes.iter().map(|node| node.calls(method)).sum()
    }

    /// Cluster definition the nodes would publish
    pub fn cluster(&self) -> Cluster {
        let members: Vec<ClusterMember> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| ClusterMember {
                identity: node.identity(),
                grpc_endpoint: endpoint(i as u8 + 1),
                public_key: node.public_key(),
            })
            .collect();
        Cluster {
            leader: members[0].clone(),
            members,
            prime: Prime::Safe64Bits,
            polynomial_degree: 1,
            kappa: 0,
        }
    }

    /// Factory serving the bootnode (the leader) and every member endpoint;
    /// the leader publishes [`TestCluster::cluster`]
    pub fn transport_factory(&self) -> MockTransportFactory {
        self.leader().set_cluster(self.cluster());
        self.nodes.iter().enumerate().fold(
            MockTransportFactory::new().with_node(TEST_BOOTNODE_URL, Arc::clone(self.leader())),
            |factory, (i, node)| factory.with_node(endpoint(i as u8 + 1), Arc::clone(node)),
        )
    }

    /// Configuration pointing at [`TEST_BOOTNODE_URL`]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            bootnode_url: TEST_BOOTNODE_URL.to_string(),
            user_seed: TEST_USER_SEED.to_string(),
            ..ClientConfig::default()
        }
    }

    /// Builder bootstrapping a fresh client against these nodes
    pub fn client_builder(&self, config: ClientConfig) -> (VmClientBuilder, Arc<MockMaskerFactory>) {
        let maskers = Arc::new(MockMaskerFactory::default());
        let builder = VmClientBuilder::new(
            config,
            Arc::new(self.transport_factory()),
            maskers.clone(),
            Arc::new(MockSigner::new()),
            Arc::new(MockBroadcaster::new(Arc::clone(&self.chain))),
        );
        (builder, maskers)
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}
