//! Every client operation end to end against an in-memory cluster

use assert_matches::assert_matches;
use nilvm_client::Operation;
use nilvm_core::effects::RetryPolicy;
use nilvm_core::messages::{PoolStatusResponse, PreprocessingOffsets};
use nilvm_core::{
    NadaValue, NadaValues, NetworkFailure, NilError, PermissionCommand, ProgramId, RpcCode,
    TransportError, UserId, ValuesId, ValuesPermissions,
};
use nilvm_testkit::*;
use std::time::Duration;

const PROGRAM: &[u8] = b"compiled echo program";

fn other_user() -> UserId {
    UserId::from_bytes([0x42; 20])
}

async fn store(cluster: &TestCluster, values: NadaValues) -> ValuesId {
    let client = &cluster.client;
    let mut config = client.store_values().ttl(30);
    config.values = values;
    config.build(client).unwrap().invoke().await.unwrap()
}

async fn store_program(cluster: &TestCluster) -> ProgramId {
    let client = &cluster.client;
    client
        .store_program()
        .name("echo")
        .program(PROGRAM.to_vec())
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap()
}

async fn retrieve(cluster: &TestCluster, id: ValuesId) -> Result<NadaValues, NilError> {
    let client = &cluster.client;
    client.retrieve_values().id(id).build(client)?.invoke().await
}

#[tokio::test]
async fn stored_values_come_back_unmasked() {
    let cluster = TestCluster::new();
    let values = NadaValues::new()
        .with("secret", NadaValue::SecretInteger(-5))
        .with("blob", NadaValue::SecretBlob(vec![1; 20]))
        .with("flag", NadaValue::Boolean(true));

    let id = store(&cluster, values.clone()).await;

    assert_eq!(retrieve(&cluster, id).await.unwrap(), values);
}

#[tokio::test]
async fn store_requires_values_and_a_valid_ttl() {
    let cluster = TestCluster::new();
    let client = &cluster.client;

    assert_matches!(
        client.store_values().ttl(1).build(client),
        Err(NilError::Invalid { .. })
    );
    assert_matches!(
        client
            .store_values()
            .value("a", NadaValue::Integer(1))
            .build(client),
        Err(NilError::Invalid { .. })
    );
}

#[tokio::test]
async fn update_overwrites_values_in_place() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = store(&cluster, NadaValues::new().with("a", NadaValue::SecretInteger(1))).await;

    let updated = client
        .store_values()
        .ttl(30)
        .value("a", NadaValue::SecretInteger(2))
        .update(id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(updated, id);
    assert_eq!(
        retrieve(&cluster, id).await.unwrap(),
        NadaValues::new().with("a", NadaValue::SecretInteger(2))
    );
}

#[tokio::test]
async fn deleted_values_are_gone_from_every_node() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = store(&cluster, NadaValues::new().with("a", NadaValue::SecretInteger(1))).await;
    let balance = cluster.leader().balance();

    let deleted = client
        .delete_values()
        .id(id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(deleted, id);
    assert_eq!(cluster.leader().balance(), balance);
    assert!(cluster.nodes.iter().all(|node| node.stored_values(id).is_none()));
    assert_matches!(
        retrieve(&cluster, id).await,
        Err(NilError::Transport(TransportError::Status {
            code: RpcCode::NotFound,
            ..
        }))
    );
}

#[tokio::test]
async fn program_id_names_owner_and_digest() {
    let cluster = TestCluster::new();

    let id = store_program(&cluster).await;

    assert!(id.as_str().starts_with(&format!("{}/echo/sha256/", cluster.user.to_hex())));
    for node in &cluster.nodes {
        assert_eq!(node.programs(), vec![id.as_str().to_string()]);
    }
}

#[tokio::test]
async fn program_name_length_is_bounded() {
    let cluster = TestCluster::new();
    let client = &cluster.client;

    for name in [String::new(), "p".repeat(101)] {
        assert_matches!(
            client
                .store_program()
                .name(name)
                .program(PROGRAM.to_vec())
                .build(client),
            Err(NilError::Invalid { .. })
        );
    }
    assert!(client
        .store_program()
        .name("p".repeat(100))
        .program(PROGRAM.to_vec())
        .build(client)
        .is_ok());
    assert_matches!(
        client.store_program().name("empty").build(client),
        Err(NilError::Invalid { .. })
    );
}

#[tokio::test]
async fn computation_outputs_are_unmasked() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let program = store_program(&cluster).await;
    let stored = store(&cluster, NadaValues::new().with("x", NadaValue::SecretInteger(9))).await;

    let compute_id = client
        .invoke_compute()
        .program(program)
        .value_ids([stored])
        .compute_time_value("y", NadaValue::SecretInteger(3))
        .input_party("Party1", cluster.user)
        .output_party("Party1", vec![cluster.user])
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    let outputs = client
        .retrieve_compute_result()
        .id(compute_id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(
        outputs,
        NadaValues::new().with("y", NadaValue::SecretInteger(3))
    );
    assert_eq!(cluster.calls("retrieve_results"), 3);
}

#[tokio::test]
async fn compute_rejects_repeated_value_ids_and_empty_party_names() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let program = store_program(&cluster).await;
    let id = ValuesId(uuid::Uuid::from_bytes([5; 16]));

    assert_matches!(
        client
            .invoke_compute()
            .program(program.clone())
            .value_ids([id, id])
            .build(client),
        Err(NilError::Invalid { .. })
    );
    assert_matches!(
        client
            .invoke_compute()
            .program(program)
            .input_party("", cluster.user)
            .build(client),
        Err(NilError::Invalid { .. })
    );
    assert_matches!(
        client.invoke_compute().build(client),
        Err(NilError::Invalid { .. })
    );
}

async fn start_computation(cluster: &TestCluster) -> nilvm_core::ComputeId {
    let client = &cluster.client;
    let program = store_program(cluster).await;
    client
        .invoke_compute()
        .program(program)
        .compute_time_value("y", NadaValue::SecretInteger(3))
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap()
}

#[tokio::test]
async fn failed_computation_is_reported_once() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let compute_id = start_computation(&cluster).await;
    cluster
        .node(2)
        .set_result_behavior(ResultBehavior::Fail("division by zero".to_string()));

    let err = client
        .retrieve_compute_result()
        .id(compute_id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap_err();

    assert_matches!(err, NilError::Compute { message } if message == "division by zero");
    assert_eq!(cluster.node(2).calls("retrieve_results"), 1);
}

#[tokio::test]
async fn closed_result_stream_is_retried() {
    let cluster = TestCluster::builder()
        .retry(RetryPolicy::fixed(Duration::from_millis(1)).with_max_attempts(3))
        .build();
    let client = &cluster.client;
    let compute_id = start_computation(&cluster).await;
    cluster.node(3).set_result_behavior(ResultBehavior::Truncate);

    let err = client
        .retrieve_compute_result()
        .id(compute_id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap_err();

    assert_matches!(
        err,
        NilError::Transport(TransportError::Network {
            kind: NetworkFailure::Aborted,
            ..
        })
    );
    assert_eq!(cluster.node(3).calls("retrieve_results"), 3);
}

#[tokio::test]
async fn permissions_default_to_the_owner() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = store(&cluster, NadaValues::new().with("a", NadaValue::SecretInteger(1))).await;

    let permissions = client
        .retrieve_permissions()
        .id(id)
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(permissions, ValuesPermissions::default_for(cluster.user));
}

#[tokio::test]
async fn granted_permissions_reach_every_node() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = store(&cluster, NadaValues::new().with("a", NadaValue::SecretInteger(1))).await;

    let updated = client
        .update_permissions()
        .id(id)
        .retrieve(PermissionCommand::default().grant(other_user()))
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(updated, id);
    for node in &cluster.nodes {
        let permissions = node.permissions_of(id).unwrap();
        assert!(permissions.retrieve.contains(&other_user()));
        assert!(!permissions.update.contains(&other_user()));
    }
}

#[tokio::test]
async fn update_without_changes_is_rejected() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = ValuesId(uuid::Uuid::from_bytes([6; 16]));

    assert_matches!(
        client.update_permissions().id(id).build(client),
        Err(NilError::Invalid { .. })
    );
    assert_matches!(
        client
            .update_permissions()
            .id(id)
            .delete(PermissionCommand::default().grant(other_user()).revoke(other_user()))
            .build(client),
        Err(NilError::Invalid { .. })
    );
}

#[tokio::test]
async fn overwritten_permissions_replace_the_old_ones() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let id = store(&cluster, NadaValues::new().with("a", NadaValue::SecretInteger(1))).await;
    let replacement = ValuesPermissions::default_for(cluster.user).grant_delete(other_user());

    let written = client
        .overwrite_permissions()
        .id(id)
        .permissions(replacement.clone())
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(written, replacement);
    for node in &cluster.nodes {
        assert_eq!(node.permissions_of(id), Some(replacement.clone()));
    }
}

#[tokio::test]
async fn pool_status_is_asked_of_the_leader_only() {
    let cluster = TestCluster::new();
    let client = &cluster.client;
    let status = PoolStatusResponse {
        offsets: vec![PreprocessingOffsets {
            element: "compare".to_string(),
            start: 10,
            end: 250,
        }],
        preprocessing_active: true,
    };
    cluster.leader().set_pool_status(status.clone());

    let answered = client
        .query_pool_status()
        .build(client)
        .unwrap()
        .invoke()
        .await
        .unwrap();

    assert_eq!(answered, status);
    assert_eq!(cluster.leader().calls("pool_status"), 1);
    assert_eq!(cluster.node(2).calls("pool_status"), 0);
    assert_eq!(cluster.node(3).calls("pool_status"), 0);
}

#[tokio::test]
async fn operations_report_their_names() {
    let cluster = TestCluster::new();
    let client = &cluster.client;

    let op = client.query_pool_status().build(client).unwrap();
    assert_eq!(op.name(), "query_pool_status");
    let op = client
        .retrieve_values()
        .id(ValuesId(uuid::Uuid::from_bytes([7; 16])))
        .build(client)
        .unwrap();
    assert_eq!(op.name(), "retrieve_values");
}
