//! Payment gate: quotes, balance, on-chain fallback and funding

use assert_matches::assert_matches;
use ed25519_dalek::VerifyingKey;
use nilvm_client::{Operation, PaymentClientBuilder};
use nilvm_core::effects::NodeTransport;
use nilvm_core::messages::PoolStatusResponse;
use nilvm_core::{NilError, PaymentMode, PriceQuoteRequest, RpcCode, TransportError};
use nilvm_testkit::*;
use std::sync::Arc;

async fn pool_status(cluster: &TestCluster) -> Result<PoolStatusResponse, NilError> {
    let client = &cluster.client;
    client.query_pool_status().build(client)?.invoke().await
}

fn key_of(node: &MockNode) -> VerifyingKey {
    VerifyingKey::from_bytes(&node.public_key().try_into().unwrap()).unwrap()
}

#[tokio::test]
async fn balance_is_charged_per_operation() {
    let cluster = TestCluster::new();

    pool_status(&cluster).await.unwrap();

    assert_eq!(
        cluster.leader().balance(),
        DEFAULT_TEST_BALANCE - DEFAULT_QUOTE_TOTAL
    );
    assert!(cluster.chain.payments().is_empty());
    let balance = cluster.client.account_balance().await.unwrap();
    assert_eq!(balance.balance, DEFAULT_TEST_BALANCE - DEFAULT_QUOTE_TOTAL);
}

#[tokio::test]
async fn empty_balance_falls_back_to_one_chain_payment() {
    let cluster = TestCluster::builder().balance(0).build();

    pool_status(&cluster).await.unwrap();

    assert_eq!(cluster.leader().calls("price_quote"), 1);
    assert_eq!(cluster.leader().calls("payment_receipt"), 2);
    let payments = cluster.chain.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount[0].amount, DEFAULT_QUOTE_TOTAL);
    assert_eq!(payments[0].from_address, test_address());
}

#[tokio::test]
async fn second_balance_rejection_is_reported_as_insufficient_balance() {
    let cluster = TestCluster::new();
    cluster.leader().fail_times(
        "payment_receipt",
        2,
        TransportError::status(RpcCode::FailedPrecondition, "Insufficient balance"),
    );

    let err = pool_status(&cluster).await.unwrap_err();

    assert_matches!(err, NilError::InsufficientBalance { .. });
    assert_eq!(cluster.chain.payments().len(), 1);
    assert_eq!(cluster.leader().calls("payment_receipt"), 2);
}

#[tokio::test]
async fn other_receipt_failures_do_not_trigger_chain_payment() {
    let cluster = TestCluster::new();
    cluster.leader().fail_next(
        "payment_receipt",
        TransportError::status(RpcCode::PermissionDenied, "insufficient balance"),
    );

    let err = pool_status(&cluster).await.unwrap_err();

    assert_matches!(
        err,
        NilError::Transport(TransportError::Status {
            code: RpcCode::PermissionDenied,
            ..
        })
    );
    assert!(cluster.chain.payments().is_empty());
}

#[tokio::test]
async fn pay_per_operation_pays_on_chain_first() {
    let cluster = TestCluster::builder()
        .payment_mode(PaymentMode::PayPerOperation)
        .balance(0)
        .build();

    pool_status(&cluster).await.unwrap();

    assert_eq!(cluster.leader().calls("payment_receipt"), 1);
    assert_eq!(cluster.chain.payments().len(), 1);
    assert_eq!(cluster.leader().balance(), 0);
}

#[tokio::test]
async fn chain_failure_stops_before_validation() {
    let cluster = TestCluster::builder()
        .payment_mode(PaymentMode::PayPerOperation)
        .build();
    cluster.chain.fail_with(NilError::chain("node offline"));

    let err = pool_status(&cluster).await.unwrap_err();

    assert_matches!(err, NilError::Chain { .. });
    assert_eq!(cluster.leader().calls("payment_receipt"), 0);
}

#[tokio::test]
async fn substituted_quote_is_rejected() {
    let cluster = TestCluster::new();
    cluster
        .leader()
        .set_quote_behavior(QuoteBehavior::Substitute(PriceQuoteRequest::RetrieveValues {
            values_id: nilvm_core::ValuesId(uuid::Uuid::from_bytes([3; 16])),
        }));

    let err = pool_status(&cluster).await.unwrap_err();

    assert_matches!(err, NilError::QuoteMismatch { .. });
    assert_eq!(cluster.leader().calls("payment_receipt"), 0);
    assert_eq!(cluster.calls("pool_status"), 0);
}

#[tokio::test]
async fn expired_and_unsigned_quotes_are_rejected() {
    for behavior in [QuoteBehavior::Expired, QuoteBehavior::Unsigned] {
        let cluster = TestCluster::new();
        cluster.leader().set_quote_behavior(behavior);

        let err = pool_status(&cluster).await.unwrap_err();

        assert_matches!(err, NilError::QuoteMismatch { .. });
        assert_eq!(cluster.leader().balance(), DEFAULT_TEST_BALANCE);
    }
}

#[tokio::test]
async fn quote_signed_by_another_key_is_rejected() {
    let cluster = TestCluster::new();
    let leader: Arc<dyn NodeTransport> = cluster.leader().clone();
    let payer = PaymentClientBuilder::new(
        Arc::new(MockSigner::new()),
        Arc::new(MockBroadcaster::new(Arc::clone(&cluster.chain))),
        leader,
        cluster.user,
    )
    .leader_public_key(Some(key_of(cluster.node(2))))
    .build()
    .await
    .unwrap();

    let err = payer.quote(&PriceQuoteRequest::PoolStatus).await.unwrap_err();

    assert_matches!(err, NilError::QuoteMismatch { .. });
}

#[tokio::test]
async fn signer_without_accounts_cannot_pay() {
    let cluster = TestCluster::new();
    let leader: Arc<dyn NodeTransport> = cluster.leader().clone();

    let err = PaymentClientBuilder::new(
        Arc::new(MockSigner::without_accounts()),
        Arc::new(MockBroadcaster::new(Arc::clone(&cluster.chain))),
        leader,
        cluster.user,
    )
    .build()
    .await
    .unwrap_err();

    assert_matches!(err, NilError::Chain { .. });
}

#[tokio::test]
async fn add_funds_credits_the_balance() {
    let cluster = TestCluster::builder().balance(0).build();
    let amount = DEFAULT_MINIMUM_ADD_FUNDS * 2;

    cluster.client.add_funds(amount).await.unwrap();

    assert_eq!(cluster.leader().balance(), amount);
    let payments = cluster.chain.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(cluster.chain.paid_for(&payments[0].resource), amount);

    pool_status(&cluster).await.unwrap();
    assert_eq!(cluster.leader().balance(), amount - DEFAULT_QUOTE_TOTAL);
}

#[tokio::test]
async fn add_funds_below_minimum_is_refused_locally() {
    let cluster = TestCluster::new();

    let config = cluster.client.payments_config().await.unwrap();
    assert_eq!(config.minimum_add_funds_payment, DEFAULT_MINIMUM_ADD_FUNDS);

    for amount in [0, DEFAULT_MINIMUM_ADD_FUNDS - 1] {
        let err = cluster.client.add_funds(amount).await.unwrap_err();
        assert_matches!(err, NilError::Invalid { .. });
    }
    assert!(cluster.chain.payments().is_empty());
    assert_eq!(cluster.leader().calls("add_funds"), 0);
}
