//! In-memory cluster node
//!
//! [`MockNode`] serves every node RPC from local state. Tests script failures
//! per method, inspect call counts and the receipts each node saw, and steer
//! the leader's payment behaviour (balance, quote tampering, expiry).
//!
//! Method names used by [`MockNode::fail_next`] and [`MockNode::calls`] are
//! the snake case RPC names, e.g. `"store_values"` or `"payment_receipt"`.

use crate::chain::MockChain;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use ed25519_dalek::{Signer as _, SigningKey};
use futures::stream;
use nilvm_core::effects::rpc::{
    ComputeResultStream, ComputeRpc, LeaderQueriesRpc, MembershipRpc, PaymentsRpc,
    PermissionsRpc, ProgramsRpc, RpcResult, ValuesRpc,
};
use nilvm_core::messages::{
    AddFundsRequest, ComputeResultState, DeleteValuesRequest, InvokeComputeRequest,
    InvokeComputeResponse, OverwritePermissionsRequest, PaymentReceiptRequest, PoolStatusRequest,
    PoolStatusResponse, RetrievePermissionsRequest, RetrieveResultsRequest,
    RetrieveValuesRequest, RetrieveValuesResponse, StoreProgramRequest, StoreProgramResponse,
    StoreValuesRequest, StoreValuesResponse, UpdatePermissionsRequest,
};
use nilvm_core::{
    AccountBalance, AddFundsPayload, Cluster, ComputeId, EncodedValues, PartyId,
    PaymentsConfig, PermissionCommand, PriceQuote, PriceQuoteRequest, QuoteFees, Receipt,
    RpcCode, SignedQuote, SignedReceipt, TransportError, UserId, ValuesId, ValuesPermissions,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// Price the leader quotes for every operation unless told otherwise
pub const DEFAULT_QUOTE_TOTAL: u64 = 100;

/// Smallest add-funds payment the leader accepts unless told otherwise
pub const DEFAULT_MINIMUM_ADD_FUNDS: u64 = 1_000;

/// How the leader shapes the quotes it hands out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QuoteBehavior {
    /// Honest, signed, unexpired quotes
    #[default]
    Honest,
    /// Quotes already past their expiry
    Expired,
    /// Quotes with an empty signature
    Unsigned,
    /// Quotes pricing a different request than the one asked for
    Substitute(PriceQuoteRequest),
}

/// How the compute result stream ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultBehavior {
    /// One waiting message, then the result
    #[default]
    Succeed,
    /// One waiting message, then the given error
    Fail(String),
    /// One waiting message, then the stream closes
    Truncate,
}

#[derive(Debug, Default)]
struct NodeState {
    caller: Option<UserId>,
    failures: HashMap<String, VecDeque<TransportError>>,
    calls: HashMap<String, usize>,
    receipts: Vec<Arc<SignedReceipt>>,
    values: HashMap<ValuesId, EncodedValues>,
    permissions: HashMap<ValuesId, ValuesPermissions>,
    values_id_override: Option<ValuesId>,
    programs: BTreeSet<String>,
    computations: HashMap<ComputeId, EncodedValues>,
    result_behavior: ResultBehavior,
    pool_status: Option<PoolStatusResponse>,
    cluster: Option<Cluster>,
    quote_behavior: QuoteBehavior,
    quote_total: u64,
    issued_quotes: HashMap<Vec<u8>, PriceQuote>,
    balance: u64,
    minimum_add_funds: u64,
    credited_payloads: BTreeSet<Vec<u8>>,
}

/// A cluster node held entirely in memory
#[derive(Debug)]
pub struct MockNode {
    identity: PartyId,
    key: SigningKey,
    chain: Option<Arc<MockChain>>,
    state: Mutex<NodeState>,
}

impl MockNode {
    /// Node with `identity` and a signing key derived from it
    pub fn new(identity: PartyId) -> Self {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&Sha256::digest(identity.as_bytes()));
        Self {
            identity,
            key: SigningKey::from_bytes(&seed),
            chain: None,
            state: Mutex::new(NodeState {
                quote_total: DEFAULT_QUOTE_TOTAL,
                minimum_add_funds: DEFAULT_MINIMUM_ADD_FUNDS,
                ..NodeState::default()
            }),
        }
    }

    /// Check on-chain payments against `chain`
    pub fn with_chain(mut self, chain: Arc<MockChain>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Party identity of the node
    pub fn identity(&self) -> PartyId {
        self.identity
    }

    /// Public half of the key quotes and receipts are signed with
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    /// Authenticate following calls as `user`
    pub fn set_caller(&self, user: UserId) {
        self.state.lock().caller = Some(user);
    }

    /// Fail the next call to `method` with `error`
    pub fn fail_next(&self, method: &str, error: TransportError) {
        self.fail_times(method, 1, error);
    }

    /// Fail the next `times` calls to `method` with `error`
    pub fn fail_times(&self, method: &str, times: usize, error: TransportError) {
        let mut state = self.state.lock();
        let queue = state.failures.entry(method.to_string()).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Number of calls to `method` so far, failed ones included
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Receipts attached to requests this node received, in arrival order
    pub fn receipts(&self) -> Vec<Arc<SignedReceipt>> {
        self.state.lock().receipts.clone()
    }

    /// Answer stores with `id` regardless of the receipt
    pub fn override_values_id(&self, id: ValuesId) {
        self.state.lock().values_id_override = Some(id);
    }

    /// Share stored under `id`
    pub fn stored_values(&self, id: ValuesId) -> Option<EncodedValues> {
        self.state.lock().values.get(&id).cloned()
    }

    /// Permissions recorded for `id`
    pub fn permissions_of(&self, id: ValuesId) -> Option<ValuesPermissions> {
        self.state.lock().permissions.get(&id).cloned()
    }

    /// Programs stored on this node
    pub fn programs(&self) -> Vec<String> {
        self.state.lock().programs.iter().cloned().collect()
    }

    /// Shape the next compute result streams
    pub fn set_result_behavior(&self, behavior: ResultBehavior) {
        self.state.lock().result_behavior = behavior;
    }

    /// Answer pool status queries with `status`
    pub fn set_pool_status(&self, status: PoolStatusResponse) {
        self.state.lock().pool_status = Some(status);
    }

    /// Publish `cluster` through the membership service
    pub fn set_cluster(&self, cluster: Cluster) {
        self.state.lock().cluster = Some(cluster);
    }

    /// Shape the quotes handed out from now on
    pub fn set_quote_behavior(&self, behavior: QuoteBehavior) {
        self.state.lock().quote_behavior = behavior;
    }

    /// Price every operation at `total` unil
    pub fn set_quote_total(&self, total: u64) {
        self.state.lock().quote_total = total;
    }

    /// Replace the prepaid balance
    pub fn set_balance(&self, balance: u64) {
        self.state.lock().balance = balance;
    }

    /// Current prepaid balance
    pub fn balance(&self) -> u64 {
        self.state.lock().balance
    }

    /// Smallest add-funds payment accepted
    pub fn set_minimum_add_funds(&self, minimum: u64) {
        self.state.lock().minimum_add_funds = minimum;
    }

    fn enter(&self, method: &str) -> RpcResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(method.to_string()).or_default() += 1;
        match state.failures.get_mut(method).and_then(VecDeque::pop_front) {
            Some(error) => {
                tracing::debug!(node = %self.identity, method, error = %error, "Scripted failure");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn caller(&self) -> RpcResult<UserId> {
        self.state
            .lock()
            .caller
            .ok_or_else(|| TransportError::status(RpcCode::Unauthenticated, "no caller"))
    }

    /// Record `receipt` and check it pays for an operation of `kind`
    fn accept_receipt(&self, receipt: &Arc<SignedReceipt>, kind: &str) -> RpcResult<Receipt> {
        self.state.lock().receipts.push(Arc::clone(receipt));
        let decoded = receipt
            .decode()
            .map_err(|e| TransportError::status(RpcCode::InvalidArgument, e.to_string()))?;
        if decoded.metadata.kind() != kind {
            return Err(TransportError::status(
                RpcCode::InvalidArgument,
                format!("receipt pays for {}, not {kind}", decoded.metadata.kind()),
            ));
        }
        if decoded.expires_at <= Utc::now() {
            return Err(TransportError::status(
                RpcCode::FailedPrecondition,
                "receipt expired",
            ));
        }
        Ok(decoded)
    }

    fn values_id(bytes: &[u8]) -> RpcResult<ValuesId> {
        ValuesId::from_slice(bytes)
            .map_err(|e| TransportError::status(RpcCode::InvalidArgument, e.to_string()))
    }

    fn not_found(what: impl std::fmt::Display) -> TransportError {
        TransportError::status(RpcCode::NotFound, format!("{what} not found"))
    }

    fn denied(action: &str) -> TransportError {
        TransportError::status(
            RpcCode::PermissionDenied,
            format!("user is not allowed to {action}"),
        )
    }

    fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        self.key.sign(bytes).to_bytes().to_vec()
    }

    fn chain(&self) -> RpcResult<&MockChain> {
        self.chain.as_deref().ok_or_else(|| {
            TransportError::status(RpcCode::Unimplemented, "node has no payment chain")
        })
    }
}

fn apply(users: &mut BTreeSet<UserId>, command: &PermissionCommand) {
    users.extend(command.grant.iter().copied());
    for user in &command.revoke {
        users.remove(user);
    }
}

fn internal(error: impl std::fmt::Display) -> TransportError {
    TransportError::status(RpcCode::Internal, error.to_string())
}

#[async_trait]
impl ValuesRpc for MockNode {
    async fn store_values(&self, request: &StoreValuesRequest) -> RpcResult<StoreValuesResponse> {
        self.enter("store_values")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "store_values")?;
        let caller = self.caller()?;

        let mut state = self.state.lock();
        let id = match &request.update_identifier {
            Some(bytes) => {
                let id = Self::values_id(bytes)?;
                let permissions = state
                    .permissions
                    .get(&id)
                    .ok_or_else(|| Self::not_found(id))?;
                if !permissions.update.contains(&caller) {
                    return Err(Self::denied("update"));
                }
                id
            }
            None => Self::values_id(&receipt.identifier)?,
        };

        state.values.insert(id, request.bincode_values.clone());
        let permissions = request
            .permissions
            .clone()
            .or_else(|| state.permissions.get(&id).cloned())
            .unwrap_or_else(|| ValuesPermissions::default_for(caller));
        state.permissions.insert(id, permissions);

        let answered = state.values_id_override.unwrap_or(id);
        Ok(StoreValuesResponse {
            values_id: answered.to_bytes(),
        })
    }

    async fn retrieve_values(
        &self,
        request: &RetrieveValuesRequest,
    ) -> RpcResult<RetrieveValuesResponse> {
        self.enter("retrieve_values")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "retrieve_values")?;
        let caller = self.caller()?;
        let PriceQuoteRequest::RetrieveValues { values_id } = receipt.metadata else {
            return Err(internal("receipt kind already checked"));
        };

        let state = self.state.lock();
        let values = state
            .values
            .get(&values_id)
            .ok_or_else(|| Self::not_found(values_id))?;
        let allowed = state
            .permissions
            .get(&values_id)
            .is_some_and(|p| p.retrieve.contains(&caller));
        if !allowed {
            return Err(Self::denied("retrieve"));
        }
        Ok(RetrieveValuesResponse {
            bincode_values: values.clone(),
        })
    }

    async fn delete_values(&self, request: &DeleteValuesRequest) -> RpcResult<()> {
        self.enter("delete_values")?;
        let caller = self.caller()?;
        let id = Self::values_id(&request.values_id)?;

        let mut state = self.state.lock();
        let permissions = state
            .permissions
            .get(&id)
            .ok_or_else(|| Self::not_found(id))?;
        if !permissions.delete.contains(&caller) {
            return Err(Self::denied("delete"));
        }
        state.values.remove(&id);
        state.permissions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ComputeRpc for MockNode {
    async fn invoke_compute(
        &self,
        request: &InvokeComputeRequest,
    ) -> RpcResult<InvokeComputeResponse> {
        self.enter("invoke_compute")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "invoke_compute")?;
        let caller = self.caller()?;
        let PriceQuoteRequest::InvokeCompute { program_id, .. } = receipt.metadata else {
            return Err(internal("receipt kind already checked"));
        };

        let mut state = self.state.lock();
        for id in &request.value_ids {
            let permissions = state
                .permissions
                .get(id)
                .ok_or_else(|| Self::not_found(id))?;
            let allowed = permissions.owner == caller
                || permissions
                    .compute
                    .get(&caller)
                    .is_some_and(|programs| programs.contains(&program_id));
            if !allowed {
                return Err(Self::denied("compute"));
            }
        }

        let compute_id = ComputeId::from_slice(&receipt.identifier).map_err(internal)?;
        // The "program" echoes the compute-time values back as its output
        state
            .computations
            .insert(compute_id, request.bincode_values.clone());
        Ok(InvokeComputeResponse {
            compute_id: compute_id.to_bytes(),
        })
    }

    async fn retrieve_results(
        &self,
        request: &RetrieveResultsRequest,
    ) -> RpcResult<ComputeResultStream> {
        self.enter("retrieve_results")?;
        let id = ComputeId::from_slice(&request.compute_id)
            .map_err(|e| TransportError::status(RpcCode::InvalidArgument, e.to_string()))?;

        let state = self.state.lock();
        let output = state
            .computations
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))?;

        let mut items: Vec<RpcResult<ComputeResultState>> =
            vec![Ok(ComputeResultState::WaitingComputation)];
        match &state.result_behavior {
            ResultBehavior::Succeed => items.push(Ok(ComputeResultState::Success {
                bincode_values: output,
            })),
            ResultBehavior::Fail(message) => items.push(Ok(ComputeResultState::Error {
                message: message.clone(),
            })),
            ResultBehavior::Truncate => {}
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

#[async_trait]
impl PermissionsRpc for MockNode {
    async fn retrieve_permissions(
        &self,
        request: &RetrievePermissionsRequest,
    ) -> RpcResult<ValuesPermissions> {
        self.enter("retrieve_permissions")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "retrieve_permissions")?;
        let PriceQuoteRequest::RetrievePermissions { values_id } = receipt.metadata else {
            return Err(internal("receipt kind already checked"));
        };
        self.state
            .lock()
            .permissions
            .get(&values_id)
            .cloned()
            .ok_or_else(|| Self::not_found(values_id))
    }

    async fn update_permissions(&self, request: &UpdatePermissionsRequest) -> RpcResult<()> {
        self.enter("update_permissions")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "update_permissions")?;
        let caller = self.caller()?;
        let PriceQuoteRequest::UpdatePermissions { values_id } = receipt.metadata else {
            return Err(internal("receipt kind already checked"));
        };

        let mut state = self.state.lock();
        let permissions = state
            .permissions
            .get_mut(&values_id)
            .ok_or_else(|| Self::not_found(values_id))?;
        if permissions.owner != caller {
            return Err(Self::denied("update permissions"));
        }
        apply(&mut permissions.retrieve, &request.retrieve);
        apply(&mut permissions.update, &request.update);
        apply(&mut permissions.delete, &request.delete);
        for (user, programs) in &request.compute.grant {
            permissions
                .compute
                .entry(*user)
                .or_default()
                .extend(programs.iter().cloned());
        }
        for (user, programs) in &request.compute.revoke {
            if let Some(granted) = permissions.compute.get_mut(user) {
                granted.retain(|program| !programs.contains(program));
                if granted.is_empty() {
                    permissions.compute.remove(user);
                }
            }
        }
        Ok(())
    }

    async fn overwrite_permissions(&self, request: &OverwritePermissionsRequest) -> RpcResult<()> {
        self.enter("overwrite_permissions")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "overwrite_permissions")?;
        let caller = self.caller()?;
        let PriceQuoteRequest::OverwritePermissions { values_id } = receipt.metadata else {
            return Err(internal("receipt kind already checked"));
        };

        let mut state = self.state.lock();
        let current = state
            .permissions
            .get(&values_id)
            .ok_or_else(|| Self::not_found(values_id))?;
        if current.owner != caller {
            return Err(Self::denied("overwrite permissions"));
        }
        state
            .permissions
            .insert(values_id, request.permissions.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgramsRpc for MockNode {
    async fn store_program(&self, request: &StoreProgramRequest) -> RpcResult<StoreProgramResponse> {
        self.enter("store_program")?;
        let receipt = self.accept_receipt(&request.signed_receipt, "store_program")?;
        let caller = self.caller()?;
        let PriceQuoteRequest::StoreProgram {
            name,
            contents_sha256,
            ..
        } = receipt.metadata
        else {
            return Err(internal("receipt kind already checked"));
        };

        if Sha256::digest(&request.program).as_slice() != contents_sha256.as_slice() {
            return Err(TransportError::status(
                RpcCode::InvalidArgument,
                "program does not match the paid digest",
            ));
        }
        let program_id = format!(
            "{}/{name}/sha256/{}",
            caller.to_hex(),
            hex::encode(&contents_sha256)
        );
        self.state.lock().programs.insert(program_id.clone());
        Ok(StoreProgramResponse { program_id })
    }
}

#[async_trait]
impl LeaderQueriesRpc for MockNode {
    async fn pool_status(&self, request: &PoolStatusRequest) -> RpcResult<PoolStatusResponse> {
        self.enter("pool_status")?;
        self.accept_receipt(&request.signed_receipt, "pool_status")?;
        Ok(self.state.lock().pool_status.clone().unwrap_or(PoolStatusResponse {
            offsets: Vec::new(),
            preprocessing_active: false,
        }))
    }
}

#[async_trait]
impl PaymentsRpc for MockNode {
    async fn price_quote(&self, request: &PriceQuoteRequest) -> RpcResult<SignedQuote> {
        self.enter("price_quote")?;
        let mut state = self.state.lock();

        let now = Utc::now();
        let (quoted, expires_at) = match &state.quote_behavior {
            QuoteBehavior::Substitute(other) => (other.clone(), now + Duration::minutes(5)),
            QuoteBehavior::Expired => (request.clone(), now - Duration::minutes(1)),
            QuoteBehavior::Honest | QuoteBehavior::Unsigned => {
                (request.clone(), now + Duration::minutes(5))
            }
        };
        let total = state.quote_total;
        let quote = PriceQuote {
            nonce: Uuid::new_v4().as_bytes().to_vec(),
            fees: QuoteFees {
                base_fee: total,
                total,
                ..QuoteFees::default()
            },
            request: quoted,
            expires_at,
        };

        let bytes = bincode::serialize(&quote).map_err(internal)?;
        let signature = match state.quote_behavior {
            QuoteBehavior::Unsigned => Vec::new(),
            _ => self.sign(&bytes),
        };
        state.issued_quotes.insert(quote.nonce.clone(), quote);
        Ok(SignedQuote {
            quote: bytes,
            signature,
        })
    }

    async fn payment_receipt(&self, request: &PaymentReceiptRequest) -> RpcResult<SignedReceipt> {
        self.enter("payment_receipt")?;
        let quote = request
            .signed_quote
            .decode()
            .map_err(|e| TransportError::status(RpcCode::InvalidArgument, e.to_string()))?;

        let paid_on_chain = match &request.tx_hash {
            Some(_) => self.chain()?.paid_for(&quote.nonce),
            None => 0,
        };

        let mut state = self.state.lock();
        if state.issued_quotes.get(&quote.nonce) != Some(&quote) {
            return Err(TransportError::status(
                RpcCode::InvalidArgument,
                "quote was not issued by this node",
            ));
        }
        if quote.is_expired(Utc::now()) {
            return Err(TransportError::status(
                RpcCode::FailedPrecondition,
                "quote expired",
            ));
        }
        let total = quote.fees.total;
        if request.tx_hash.is_some() {
            if paid_on_chain < total {
                return Err(TransportError::status(
                    RpcCode::FailedPrecondition,
                    format!("payment of {paid_on_chain} unil does not cover {total}"),
                ));
            }
        } else if state.balance < total {
            return Err(TransportError::status(
                RpcCode::FailedPrecondition,
                format!("insufficient balance: {} < {total}", state.balance),
            ));
        } else {
            state.balance -= total;
        }
        state.issued_quotes.remove(&quote.nonce);

        let receipt = Receipt {
            identifier: quote.nonce,
            metadata: quote.request,
            expires_at: Utc::now() + Duration::hours(1),
        };
        let bytes = bincode::serialize(&receipt).map_err(internal)?;
        Ok(SignedReceipt {
            signature: self.sign(&bytes),
            receipt: bytes,
        })
    }

    async fn account_balance(&self) -> RpcResult<AccountBalance> {
        self.enter("account_balance")?;
        let now = Utc::now();
        Ok(AccountBalance {
            balance: self.state.lock().balance,
            last_updated: now,
            expires_at: now + Duration::days(30),
        })
    }

    async fn payments_config(&self) -> RpcResult<PaymentsConfig> {
        self.enter("payments_config")?;
        Ok(PaymentsConfig {
            minimum_add_funds_payment: self.state.lock().minimum_add_funds,
        })
    }

    async fn add_funds(&self, request: &AddFundsRequest) -> RpcResult<()> {
        self.enter("add_funds")?;
        let caller = self.caller()?;
        let payload: AddFundsPayload = bincode::deserialize(&request.payload)
            .map_err(|e| TransportError::status(RpcCode::InvalidArgument, e.to_string()))?;
        if payload.recipient != caller {
            return Err(Self::denied("fund another account"));
        }
        let paid = self.chain()?.paid_for(&request.payload);

        let mut state = self.state.lock();
        if paid < state.minimum_add_funds {
            return Err(TransportError::status(
                RpcCode::FailedPrecondition,
                format!("payment of {paid} unil is below the minimum"),
            ));
        }
        if !state.credited_payloads.insert(request.payload.clone()) {
            return Err(TransportError::status(
                RpcCode::AlreadyExists,
                "payment already credited",
            ));
        }
        state.balance += paid;
        Ok(())
    }
}

#[async_trait]
impl MembershipRpc for MockNode {
    async fn cluster(&self) -> RpcResult<Cluster> {
        self.enter("cluster")?;
        self.state.lock().cluster.clone().ok_or_else(|| {
            TransportError::status(RpcCode::Unavailable, "cluster not published yet")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::party;
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use nilvm_core::NetworkFailure;

    fn user() -> UserId {
        UserId::from_bytes([7; 20])
    }

    async fn receipt_for(leader: &MockNode, request: PriceQuoteRequest) -> Arc<SignedReceipt> {
        leader.set_balance(leader.balance() + DEFAULT_QUOTE_TOTAL);
        let quote = leader.price_quote(&request).await.unwrap();
        let receipt = leader
            .payment_receipt(&PaymentReceiptRequest {
                signed_quote: quote,
                tx_hash: None,
            })
            .await
            .unwrap();
        Arc::new(receipt)
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let node = MockNode::new(party(1));
        node.fail_times(
            "cluster",
            2,
            TransportError::network(NetworkFailure::Timeout, "slow"),
        );
        assert!(node.cluster().await.is_err());
        assert!(node.cluster().await.is_err());
        assert_matches!(
            node.cluster().await,
            Err(TransportError::Status {
                code: RpcCode::Unavailable,
                ..
            })
        );
        assert_eq!(node.calls("cluster"), 3);
    }

    #[tokio::test]
    async fn balance_pays_for_receipts_until_exhausted() {
        let leader = MockNode::new(party(1));
        leader.set_balance(DEFAULT_QUOTE_TOTAL);

        let quote = leader.price_quote(&PriceQuoteRequest::PoolStatus).await.unwrap();
        let receipt = leader
            .payment_receipt(&PaymentReceiptRequest {
                signed_quote: quote,
                tx_hash: None,
            })
            .await
            .unwrap();
        assert_eq!(receipt.decode().unwrap().metadata, PriceQuoteRequest::PoolStatus);
        assert_eq!(leader.balance(), 0);

        let quote = leader.price_quote(&PriceQuoteRequest::PoolStatus).await.unwrap();
        let rejected = leader
            .payment_receipt(&PaymentReceiptRequest {
                signed_quote: quote,
                tx_hash: None,
            })
            .await
            .unwrap_err();
        assert_eq!(rejected.code(), Some(RpcCode::FailedPrecondition));
        assert!(rejected.message().contains("insufficient balance"));
    }

    #[tokio::test]
    async fn quotes_are_redeemed_once() {
        let leader = MockNode::new(party(1));
        leader.set_balance(10 * DEFAULT_QUOTE_TOTAL);
        let quote = leader.price_quote(&PriceQuoteRequest::PoolStatus).await.unwrap();
        let request = PaymentReceiptRequest {
            signed_quote: quote,
            tx_hash: None,
        };
        leader.payment_receipt(&request).await.unwrap();
        assert_eq!(
            leader.payment_receipt(&request).await.unwrap_err().code(),
            Some(RpcCode::InvalidArgument)
        );
    }

    #[tokio::test]
    async fn stored_values_need_retrieve_permission() {
        let node = MockNode::new(party(1));
        node.set_caller(user());
        let receipt = receipt_for(
            &node,
            PriceQuoteRequest::StoreValues {
                particles_count: 1,
                secret_shared_count: 1,
                public_values_count: 0,
                ttl_days: 1,
                payload_size: 3,
            },
        )
        .await;
        let stored = node
            .store_values(&StoreValuesRequest {
                signed_receipt: receipt,
                bincode_values: EncodedValues(vec![1, 2, 3]),
                permissions: None,
                update_identifier: None,
            })
            .await
            .unwrap();
        let values_id = ValuesId::from_slice(&stored.values_id).unwrap();

        let receipt = receipt_for(&node, PriceQuoteRequest::RetrieveValues { values_id }).await;
        let retrieved = node
            .retrieve_values(&RetrieveValuesRequest {
                signed_receipt: Arc::clone(&receipt),
            })
            .await
            .unwrap();
        assert_eq!(retrieved.bincode_values, EncodedValues(vec![1, 2, 3]));

        node.set_caller(UserId::from_bytes([8; 20]));
        assert_eq!(
            node.retrieve_values(&RetrieveValuesRequest {
                signed_receipt: receipt,
            })
            .await
            .unwrap_err()
            .code(),
            Some(RpcCode::PermissionDenied)
        );
    }

    #[tokio::test]
    async fn result_stream_follows_behavior() {
        let node = MockNode::new(party(1));
        node.set_caller(user());
        let program_id = nilvm_core::ProgramId::new(format!(
            "{}/echo/sha256/{}",
            user().to_hex(),
            "ab".repeat(32)
        ))
        .unwrap();
        let receipt = receipt_for(
            &node,
            PriceQuoteRequest::InvokeCompute {
                program_id,
                values_payload_size: 1,
            },
        )
        .await;
        let started = node
            .invoke_compute(&InvokeComputeRequest {
                signed_receipt: receipt,
                value_ids: Vec::new(),
                bincode_values: EncodedValues(vec![4]),
                input_bindings: Vec::new(),
                output_bindings: Vec::new(),
            })
            .await
            .unwrap();
        let request = RetrieveResultsRequest {
            compute_id: started.compute_id,
        };

        let states: Vec<_> = node.retrieve_results(&request).await.unwrap().collect().await;
        assert_eq!(states.len(), 2);
        assert_matches!(states[1], Ok(ComputeResultState::Success { .. }));

        node.set_result_behavior(ResultBehavior::Truncate);
        let states: Vec<_> = node.retrieve_results(&request).await.unwrap().collect().await;
        assert_eq!(states.len(), 1);
    }
}
