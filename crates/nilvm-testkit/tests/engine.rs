//! Fan-out, retry and collapse behaviour against in-memory nodes

use assert_matches::assert_matches;
use nilvm_client::Operation;
use nilvm_core::{
    NadaValue, NadaValues, NetworkFailure, NilError, RpcCode, TransportError, ValuesId,
};
use nilvm_testkit::*;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use uuid::Uuid;

/// One captured log event
#[derive(Debug, Clone)]
struct Captured {
    level: Level,
    message: String,
    label: Option<String>,
}

impl Visit for Captured {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "label" => self.label = Some(format!("{value:?}")),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "label" => self.label = Some(value.to_string()),
            _ => {}
        }
    }
}

/// Collects every event emitted while installed as the thread default
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<Captured>>>);

impl EventLog {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    fn count(&self, level: Level, message: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|event| event.level == level && event.message == message)
            .count()
    }

    fn retries_by_label(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|event| event.level == Level::WARN)
            .filter(|event| event.message == "Recoverable failure, retrying")
            .filter_map(|event| event.label.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for EventLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = Captured {
            level: *event.metadata().level(),
            message: String::new(),
            label: None,
        };
        event.record(&mut captured);
        self.0.lock().push(captured);
    }
}

fn secrets() -> NadaValues {
    NadaValues::new()
        .with("a", NadaValue::SecretInteger(42))
        .with("b", NadaValue::Integer(7))
}

async fn store(cluster: &TestCluster) -> Result<ValuesId, NilError> {
    let client = &cluster.client;
    let mut config = client.store_values().ttl(1);
    config.values = secrets();
    config.build(client)?.invoke().await
}

#[tokio::test]
async fn agreeing_nodes_yield_the_common_id() {
    init_tracing();
    let cluster = TestCluster::builder().size(5).build();

    let id = store(&cluster).await.unwrap();

    let masker = MockMasker::new((1..=5).map(party).collect());
    for n in 1..=5 {
        let node = cluster.node(n);
        assert_eq!(node.calls("store_values"), 1);
        assert_eq!(
            node.stored_values(id),
            Some(masker.share_for(party(n), &secrets()).unwrap())
        );
    }
}

#[tokio::test]
async fn one_dissenting_node_of_five_fails_the_operation() {
    let cluster = TestCluster::builder().size(5).build();
    cluster
        .node(5)
        .override_values_id(ValuesId(Uuid::from_bytes([0xaa; 16])));

    let err = store(&cluster).await.unwrap_err();

    assert_matches!(err, NilError::Disagreement { .. });
    assert_eq!(cluster.calls("store_values"), 5);
}

#[tokio::test(start_paused = true)]
async fn fatal_node_errors_are_not_retried() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let started = tokio::time::Instant::now();

    let err = client
        .retrieve_values()
        .id(ValuesId(Uuid::from_bytes([1; 16])))
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap_err();

    assert_matches!(
        err,
        NilError::Transport(TransportError::Status {
            code: RpcCode::NotFound,
            ..
        })
    );
    for node in &cluster.nodes {
        assert_eq!(node.calls("retrieve_values"), 1);
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn transient_node_recovers_within_the_retry_budget() {
    let cluster = TestCluster::new();
    cluster.node(2).fail_times(
        "store_values",
        3,
        TransportError::status(RpcCode::Unavailable, "restarting"),
    );
    let log = EventLog::default();
    let _guard = log.install();
    let started = tokio::time::Instant::now();

    store(&cluster).await.unwrap();

    assert_eq!(cluster.node(1).calls("store_values"), 1);
    assert_eq!(cluster.node(2).calls("store_values"), 4);
    assert_eq!(cluster.node(3).calls("store_values"), 1);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(
        log.retries_by_label(),
        vec![format!("store_values@{}", party(2)); 3]
    );
    assert_eq!(log.count(Level::INFO, "Operation succeeded"), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failure_exhausts_five_attempts() {
    let cluster = TestCluster::new();
    cluster.node(3).fail_times(
        "store_values",
        10,
        TransportError::network(NetworkFailure::Timeout, "deadline"),
    );
    let log = EventLog::default();
    let _guard = log.install();
    let started = tokio::time::Instant::now();

    let err = store(&cluster).await.unwrap_err();

    assert_matches!(
        err,
        NilError::Transport(TransportError::Network {
            kind: NetworkFailure::Timeout,
            ..
        })
    );
    assert_eq!(cluster.node(3).calls("store_values"), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(
        log.retries_by_label(),
        vec![format!("store_values@{}", party(3)); 4]
    );
    assert_eq!(log.count(Level::ERROR, "Retry attempts exhausted"), 1);
    assert_eq!(log.count(Level::ERROR, "Operation failed"), 1);
}

#[tokio::test]
async fn every_node_receives_the_same_receipt() {
    let cluster = TestCluster::new();

    store(&cluster).await.unwrap();

    let receipts: Vec<_> = cluster
        .nodes
        .iter()
        .map(|node| {
            let seen = node.receipts();
            assert_eq!(seen.len(), 1);
            Arc::clone(&seen[0])
        })
        .collect();
    assert!(receipts.iter().all(|r| Arc::ptr_eq(r, &receipts[0])));
}

#[tokio::test]
async fn retried_calls_reuse_the_receipt() {
    let cluster = TestCluster::builder()
        .retry(nilvm_core::effects::RetryPolicy::fixed(Duration::from_millis(1)))
        .build();
    cluster.node(1).fail_next(
        "store_values",
        TransportError::network(NetworkFailure::ConnectionRefused, "refused"),
    );

    store(&cluster).await.unwrap();

    let seen = cluster.node(1).receipts();
    assert_eq!(seen.len(), 1);
    let other = cluster.node(2).receipts();
    assert!(Arc::ptr_eq(&seen[0], &other[0]));
    assert_eq!(cluster.node(1).calls("store_values"), 2);
}

#[tokio::test]
async fn share_for_unknown_party_stops_before_any_store() {
    let cluster = TestCluster::builder().foreign_party(party(9)).build();

    let err = store(&cluster).await.unwrap_err();

    assert_matches!(err, NilError::UnmatchedParty { party: p } if p == party(9));
    assert_eq!(cluster.calls("store_values"), 0);
}
