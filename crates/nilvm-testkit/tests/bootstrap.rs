//! Client bootstrap from a bootnode

use assert_matches::assert_matches;
use nilvm_client::Operation;
use nilvm_core::{NadaValue, NilError, Prime, RpcCode, TransportError};
use nilvm_testkit::*;

#[tokio::test]
async fn builder_discovers_the_cluster_and_connects_every_member() {
    let cluster = TestCluster::new();
    let (builder, maskers) = cluster.client_builder(cluster.client_config());

    let client = builder.build().await.unwrap();

    assert_eq!(client.user_id(), test_user());
    assert_eq!(client.leader().id, party(1));
    let ids: Vec<_> = client.nodes().iter().map(|node| node.id).collect();
    assert_eq!(ids, vec![party(1), party(2), party(3)]);
    assert_eq!(
        maskers.created(),
        Some((vec![party(1), party(2), party(3)], Prime::Safe64Bits, 1))
    );
    assert_eq!(cluster.leader().calls("cluster"), 1);
}

#[tokio::test]
async fn bootstrapped_client_runs_operations() {
    let cluster = TestCluster::new();
    let (builder, _) = cluster.client_builder(cluster.client_config());
    let client = builder.build().await.unwrap();

    let id = client
        .store_values()
        .ttl(1)
        .value("a", NadaValue::SecretInteger(11))
        .build(&client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    for node in &cluster.nodes {
        assert!(node.stored_values(id).is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn unavailable_bootnode_is_retried() {
    let cluster = TestCluster::new();
    let (builder, _) = cluster.client_builder(cluster.client_config());
    cluster.leader().fail_times(
        "cluster",
        2,
        TransportError::status(RpcCode::Unavailable, "starting"),
    );

    builder.build().await.unwrap();

    assert_eq!(cluster.leader().calls("cluster"), 3);
}

#[tokio::test]
async fn configured_leader_key_must_match_quotes() {
    let cluster = TestCluster::new();
    let mut config = cluster.client_config();
    config.leader_public_key = Some(hex::encode(cluster.node(2).public_key()));
    let (builder, _) = cluster.client_builder(config);
    let client = builder.build().await.unwrap();

    let err = client
        .query_pool_status()
        .build(&client)
        .unwrap()
        .invoke()
        .await
        .unwrap_err();

    assert_matches!(err, NilError::QuoteMismatch { .. });
}

#[tokio::test]
async fn invalid_configuration_is_rejected_before_any_call() {
    let cluster = TestCluster::new();
    let mut config = cluster.client_config();
    config.user_seed.clear();
    let (builder, _) = cluster.client_builder(config);

    assert_matches!(builder.build().await, Err(NilError::Invalid { .. }));
    assert_eq!(cluster.leader().calls("cluster"), 0);
}
