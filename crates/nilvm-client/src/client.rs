//! Client session
//!
//! A [`VmClient`] owns the cluster's node set, the masker and the payment
//! client for one user. It is cheap to clone; every operation keeps its own
//! handle. [`VmClientBuilder`] discovers the cluster from a bootnode.

use crate::auth::TokenAuthManager;
use crate::cluster::{ClusterNode, TransportFactory};
use crate::operation::{
    DeleteValuesConfig, InvokeComputeConfig, OverwritePermissionsConfig, QueryPoolStatusConfig,
    RetrieveComputeResultConfig, RetrievePermissionsConfig, RetrieveValuesConfig,
    StoreProgramConfig, StoreValuesConfig, UpdatePermissionsConfig,
};
use crate::payment::{PaymentClient, PaymentClientBuilder};
use ed25519_dalek::VerifyingKey;
use nilvm_core::effects::{
    Broadcaster, MaskerFactory, MembershipRpc, RetryPolicy, SecretMasker, Signer,
};
use nilvm_core::{
    AccountBalance, ClientConfig, Cluster, NilError, PartyId, PaymentsConfig, Result, UserId,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Everything a [`VmClient`] is assembled from
pub struct VmClientConfig {
    /// Identity of the user
    pub user_id: UserId,
    /// Payment client settling with the leader
    pub payer: PaymentClient,
    /// Masker for the cluster
    pub masker: Arc<dyn SecretMasker>,
    /// Leader node
    pub leader: ClusterNode,
    /// Every node, leader included
    pub nodes: Vec<ClusterNode>,
    /// Retry policy applied to each node call
    pub retry: RetryPolicy,
}

struct Inner {
    user_id: UserId,
    payer: PaymentClient,
    masker: Arc<dyn SecretMasker>,
    leader: ClusterNode,
    nodes: Vec<ClusterNode>,
    retry: RetryPolicy,
}

/// Client for nilVM operations
#[derive(Clone)]
pub struct VmClient {
    inner: Arc<Inner>,
}

impl VmClient {
    /// Assemble a client, checking the node set is usable
    pub fn new(config: VmClientConfig) -> Result<Self> {
        if config.nodes.is_empty() {
            return Err(NilError::invalid("cluster has no nodes"));
        }
        let mut seen = BTreeSet::new();
        for node in &config.nodes {
            if !seen.insert(node.id) {
                return Err(NilError::invalid(format!("duplicate node {}", node.id)));
            }
        }

        Ok(Self {
            inner: Arc::new(Inner {
                user_id: config.user_id,
                payer: config.payer,
                masker: config.masker,
                leader: config.leader,
                nodes: config.nodes,
                retry: config.retry,
            }),
        })
    }

    /// Identity of the user
    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    /// Every node of the cluster
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.inner.nodes
    }

    /// The leader node
    pub fn leader(&self) -> &ClusterNode {
        &self.inner.leader
    }

    /// Masker for the cluster
    pub fn masker(&self) -> &dyn SecretMasker {
        &*self.inner.masker
    }

    /// Payment client
    pub fn payer(&self) -> &PaymentClient {
        &self.inner.payer
    }

    /// Retry policy applied to node calls
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry.clone()
    }

    /// Store values in the cluster
    pub fn store_values(&self) -> StoreValuesConfig {
        StoreValuesConfig::default()
    }

    /// Retrieve and unmask stored values
    pub fn retrieve_values(&self) -> RetrieveValuesConfig {
        RetrieveValuesConfig::default()
    }

    /// Delete stored values
    pub fn delete_values(&self) -> DeleteValuesConfig {
        DeleteValuesConfig::default()
    }

    /// Run a stored program
    pub fn invoke_compute(&self) -> InvokeComputeConfig {
        InvokeComputeConfig::default()
    }

    /// Collect the outputs of a computation
    pub fn retrieve_compute_result(&self) -> RetrieveComputeResultConfig {
        RetrieveComputeResultConfig::default()
    }

    /// Upload a program
    pub fn store_program(&self) -> StoreProgramConfig {
        StoreProgramConfig::default()
    }

    /// Read the permissions of stored values
    pub fn retrieve_permissions(&self) -> RetrievePermissionsConfig {
        RetrievePermissionsConfig::default()
    }

    /// Grant or revoke permissions on stored values
    pub fn update_permissions(&self) -> UpdatePermissionsConfig {
        UpdatePermissionsConfig::default()
    }

    /// Replace the permissions of stored values
    pub fn overwrite_permissions(&self) -> OverwritePermissionsConfig {
        OverwritePermissionsConfig::default()
    }

    /// Query the preprocessing pool
    pub fn query_pool_status(&self) -> QueryPoolStatusConfig {
        QueryPoolStatusConfig
    }

    /// Prepaid balance held by the leader
    pub async fn account_balance(&self) -> Result<AccountBalance> {
        self.inner.payer.account_balance().await
    }

    /// Payment parameters published by the leader
    pub async fn payments_config(&self) -> Result<PaymentsConfig> {
        self.inner.payer.payments_config().await
    }

    /// Add `amount` unil to the prepaid balance
    pub async fn add_funds(&self, amount: u64) -> Result<()> {
        self.inner.payer.add_funds(amount).await
    }
}

impl fmt::Debug for VmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmClient")
            .field("user_id", &self.inner.user_id)
            .field("leader", &self.inner.leader.id)
            .field("nodes", &self.inner.nodes.len())
            .finish_non_exhaustive()
    }
}

/// Bootstraps a [`VmClient`] from configuration
pub struct VmClientBuilder {
    config: ClientConfig,
    transports: Arc<dyn TransportFactory>,
    maskers: Arc<dyn MaskerFactory>,
    signer: Arc<dyn Signer>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl VmClientBuilder {
    /// Start from configuration and the capabilities the client needs
    pub fn new(
        config: ClientConfig,
        transports: Arc<dyn TransportFactory>,
        maskers: Arc<dyn MaskerFactory>,
        signer: Arc<dyn Signer>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            config,
            transports,
            maskers,
            signer,
            broadcaster,
        }
    }

    /// Discover the cluster and build the client
    pub async fn build(self) -> Result<VmClient> {
        self.config.validate()?;
        let auth = Arc::new(
            TokenAuthManager::from_seed(&self.config.user_seed)
                .with_ttl(self.config.auth_token_ttl()),
        );
        let user_id = auth.user_id();
        let retry = self.config.retry.policy();

        let bootnode = self.transports.bootnode(&self.config.bootnode_url)?;
        let bootnode = bootnode.as_ref();
        let cluster = retry
            .retry_if_recoverable("cluster", || async move {
                Ok::<_, NilError>(bootnode.cluster().await?)
            })
            .await?;
        cluster.validate()?;
        tracing::info!(
            bootnode = %self.config.bootnode_url,
            members = cluster.members.len(),
            leader = %cluster.leader.identity,
            "Fetched cluster definition"
        );

        let mut nodes = Vec::with_capacity(cluster.members.len());
        for member in &cluster.members {
            let transport = self.transports.connect(member, Arc::clone(&auth))?;
            nodes.push(ClusterNode::new(member.identity, transport));
        }
        let leader = nodes
            .iter()
            .find(|node| node.id == cluster.leader.identity)
            .cloned()
            .ok_or_else(|| NilError::invalid("leader is not a cluster member"))?;

        let parties: Vec<PartyId> = nodes.iter().map(|node| node.id).collect();
        let masker = self
            .maskers
            .create(&parties, cluster.prime, cluster.polynomial_degree)?;

        let payer = PaymentClientBuilder::new(
            self.signer,
            self.broadcaster,
            Arc::clone(&leader.transport),
            user_id,
        )
        .payment_mode(self.config.payment_mode)
        .leader_public_key(leader_key(&self.config, &cluster)?)
        .build()
        .await?;

        VmClient::new(VmClientConfig {
            user_id,
            payer,
            masker,
            leader,
            nodes,
            retry,
        })
    }
}

/// Configured leader key, falling back to the one the cluster publishes
fn leader_key(config: &ClientConfig, cluster: &Cluster) -> Result<Option<VerifyingKey>> {
    if let Some(key) = &config.leader_public_key {
        let bytes = hex::decode(key)
            .map_err(|e| NilError::invalid(format!("Invalid leader_public_key: {e}")))?;
        return parse_key(&bytes)
            .map(Some)
            .ok_or_else(|| NilError::invalid("leader_public_key is not an ed25519 key"));
    }

    let published = parse_key(&cluster.leader.public_key);
    if published.is_none() {
        tracing::debug!(
            leader = %cluster.leader.identity,
            "Leader key is not ed25519, quote signatures will not be verified"
        );
    }
    Ok(published)
}

fn parse_key(bytes: &[u8]) -> Option<VerifyingKey> {
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}
