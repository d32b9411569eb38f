//! Integration tests for `MerkleQueryClient`.
//!
//! These tests drive the client against the in-process `FakeNode` from the
//! `testutil` feature, with a `RecordingSleeper` in place of real backoff.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use merkle_query::{
    Backoff, ClientConfig, ClientError, ConnectionState, MerkleQueryClient, MerkleTree, QueryMsg,
    RetryPolicy,
    testutil::{FakeNode, RecordingSleeper, TEST_CONTRACT, test_config},
};
use rstest::rstest;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

type FakeClient = MerkleQueryClient<FakeNode, RecordingSleeper>;

fn client_for(node: &FakeNode, config: ClientConfig) -> (FakeClient, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let client = MerkleQueryClient::with_transport(config, node.clone(), sleeper.clone());
    (client, sleeper)
}

async fn connected_client(node: &FakeNode) -> FakeClient {
    let (mut client, _) = client_for(node, test_config(1));
    client.connect().await.expect("connect should succeed");
    client
}

fn tree(root: &str, leaves: &[&str], metadata: &str) -> MerkleTree {
    MerkleTree {
        root: root.to_owned(),
        leaves: leaves.iter().map(|l| (*l).to_owned()).collect(),
        metadata: metadata.to_owned(),
    }
}

// ============================================================================
// Retry Budget Tests
// ============================================================================

#[rstest]
#[case::one(1)]
#[case::three(3)]
#[case::seven(7)]
#[tokio::test]
async fn test_exhausted_after_exactly_max_retries(#[case] max_retries: i32) {
    let node = FakeNode::new();
    node.fail_dials(u32::MAX);
    let (mut client, sleeper) = client_for(&node, test_config(max_retries));

    let err = client.connect().await.expect_err("connect should exhaust");

    match err {
        ClientError::ConnectionExhausted { attempts, last_error, .. } => {
            assert_eq!(attempts, max_retries as u32);
            assert!(last_error.is_transient(), "last error should be dial/verify: {last_error}");
        },
        other => panic!("expected ConnectionExhausted, got: {other:?}"),
    }
    assert_eq!(node.dial_count(), max_retries as u32);
    // No sleep after the final attempt.
    assert_eq!(sleeper.delays().len(), max_retries as usize - 1);
}

#[rstest]
#[case::negative_one(-1, 1)]
#[case::zero(0, 5)]
#[case::very_negative(-42, 25)]
#[tokio::test]
async fn test_unbounded_retries_until_success(#[case] max_retries: i32, #[case] failures: u32) {
    let node = FakeNode::new();
    node.fail_dials(failures);
    let (mut client, sleeper) = client_for(&node, test_config(max_retries));

    client.connect().await.expect("unbounded connect should eventually succeed");

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(node.dial_count(), failures + 1);
    assert_eq!(sleeper.delays().len(), failures as usize);
}

#[tokio::test]
async fn test_success_on_last_allowed_attempt() {
    let node = FakeNode::new();
    node.fail_dials(2);
    let (mut client, _) = client_for(&node, test_config(3));

    client.connect().await.expect("third attempt is within budget");
    assert_eq!(node.dial_count(), 3);
}

// ============================================================================
// Backoff Tests
// ============================================================================

#[tokio::test]
async fn test_sleeps_follow_backoff_schedule() {
    let node = FakeNode::new();
    node.fail_dials(6);
    let config = test_config(-1);
    let (mut client, sleeper) = client_for(&node, config.clone());

    client.connect().await.unwrap();

    let expected: Vec<Duration> = Backoff::new(config.retry()).take(6).collect();
    assert_eq!(sleeper.delays(), expected);
    // 10ms initial, 80ms cap
    assert_eq!(
        sleeper.delays(),
        [20, 40, 80, 80, 80, 80].map(Duration::from_millis).to_vec(),
    );
}

#[tokio::test]
async fn test_backoff_restarts_on_fresh_connect() {
    let node = FakeNode::new();
    node.fail_dials(3);
    let (mut client, sleeper) = client_for(&node, test_config(-1));
    client.connect().await.unwrap();

    node.fail_dials(1);
    client.connect().await.unwrap();

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 4);
    assert_eq!(delays[3], Duration::from_millis(20), "second cycle starts over: {delays:?}");
}

// ============================================================================
// Verification Tests
// ============================================================================

#[tokio::test]
async fn test_successful_connect_probed_configured_contract() {
    let node = FakeNode::new();
    let client = connected_client(&node).await;

    assert!(client.is_connected());
    assert_eq!(node.probed_addresses(), vec![TEST_CONTRACT.to_owned()]);
}

#[tokio::test]
async fn test_unknown_contract_never_connects() {
    let node = FakeNode::new();
    node.set_contracts(["cosmos1someothercontract"]);
    let (mut client, _) = client_for(&node, test_config(3));

    let err = client.connect().await.expect_err("probe should fail");

    let ClientError::ConnectionExhausted { last_error, .. } = err else {
        panic!("expected ConnectionExhausted, got: {err:?}");
    };
    assert!(matches!(*last_error, ClientError::VerifyFailed { .. }), "got: {last_error:?}");
    assert_eq!(node.dial_count(), 3, "each failed probe discards the channel and redials");
}

#[tokio::test]
async fn test_probe_failure_then_recovery() {
    let node = FakeNode::new();
    node.fail_probes(2);
    let (mut client, sleeper) = client_for(&node, test_config(-1));

    client.connect().await.unwrap();

    assert_eq!(node.dial_count(), 3);
    assert_eq!(node.probed_addresses().len(), 3);
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_readiness_failure_skips_probe() {
    let node = FakeNode::new();
    node.fail_readiness(1);
    let (mut client, _) = client_for(&node, test_config(-1));

    client.connect().await.unwrap();

    assert_eq!(node.dial_count(), 2);
    assert_eq!(node.probed_addresses().len(), 1, "no probe on a channel that never got ready");
}

#[tokio::test(start_paused = true)]
async fn test_hanging_dial_is_bounded_by_connection_timeout() {
    let node = FakeNode::new();
    node.hang_dials();
    let (mut client, _) = client_for(&node, test_config(2));

    let err = client.connect().await.expect_err("dial should time out");

    let ClientError::ConnectionExhausted { last_error, attempts, .. } = err else {
        panic!("expected ConnectionExhausted, got: {err:?}");
    };
    assert_eq!(attempts, 2);
    assert!(last_error.to_string().contains("timed out"), "got: {last_error}");
    let source = std::error::Error::source(&*last_error).expect("timeout kept as source");
    assert_eq!(source.to_string(), "timed out after 1s");
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancelled_before_first_attempt() {
    let node = FakeNode::new();
    let (mut client, _) = client_for(&node, test_config(-1));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.connect_with_cancel(&cancel).await.expect_err("cancelled");

    assert!(matches!(err, ClientError::Cancelled { attempts: 0 }), "got: {err:?}");
    assert_eq!(node.dial_count(), 0);
    assert_eq!(client.state(), ConnectionState::Unconnected);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_unbounded_backoff() {
    let node = FakeNode::new();
    node.fail_dials(u32::MAX);
    let config = ClientConfig::builder()
        .endpoint("fake-node:9090")
        .contract_address(TEST_CONTRACT)
        .retry(
            RetryPolicy::builder()
                .initial_backoff(Duration::from_secs(30))
                .max_backoff(Duration::from_secs(600))
                .build(),
        )
        .build()
        .unwrap();
    let mut client =
        MerkleQueryClient::with_transport(config, node.clone(), merkle_query::TokioSleeper);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        trigger.cancel();
    });

    let err = client.connect_with_cancel(&cancel).await.expect_err("cancelled");

    // Sleeps of 60s then 120s: cancellation lands during the second sleep.
    assert!(matches!(err, ClientError::Cancelled { attempts: 2 }), "got: {err:?}");
    assert_eq!(node.dial_count(), 2);
}

// ============================================================================
// Query Tests
// ============================================================================

#[tokio::test]
async fn test_get_merkle_tree_round_trip() {
    let node = FakeNode::new();
    let expected = tree("0xroot", &["0xa", "0xb", "0xc"], "batch-17");
    node.insert_tree("abc", expected.clone());
    let client = connected_client(&node).await;

    let tree = client.get_merkle_tree("abc").await.unwrap();

    assert_eq!(tree, expected);
    assert_eq!(node.received_queries(), vec![QueryMsg::GetMerkleTree { id: "abc".into() }]);
}

#[tokio::test]
async fn test_get_merkle_tree_missing_id_is_query_failed() {
    let node = FakeNode::new();
    let client = connected_client(&node).await;

    let err = client.get_merkle_tree("nope").await.expect_err("missing tree");
    assert!(matches!(err, ClientError::QueryFailed { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_list_ids_empty() {
    let node = FakeNode::new();
    node.respond_raw("[]");
    let client = connected_client(&node).await;

    assert_eq!(client.list_merkle_tree_ids().await.unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_list_ids_preserves_order() {
    let node = FakeNode::new();
    for id in ["tree-9", "tree-1", "tree-5"] {
        node.insert_tree(id, tree("r", &[], ""));
    }
    let client = connected_client(&node).await;

    let ids = client.list_merkle_tree_ids().await.unwrap();

    assert_eq!(ids, vec!["tree-9", "tree-1", "tree-5"]);
    assert_eq!(node.received_queries(), vec![QueryMsg::ListMerkleTreeIds {}]);
}

#[rstest]
#[case::truncated(r#"{"root":"0x"#)]
#[case::not_json("<html>502 Bad Gateway</html>")]
#[case::wrong_shape(r#"["a","b"]"#)]
#[case::null("null")]
#[tokio::test]
async fn test_get_merkle_tree_malformed_is_decode_failed(#[case] body: &str) {
    let node = FakeNode::new();
    node.respond_raw(body);
    let client = connected_client(&node).await;

    let err = client.get_merkle_tree("abc").await.expect_err("malformed body");
    assert!(matches!(err, ClientError::DecodeFailed { .. }), "got: {err:?}");
}

#[rstest]
#[case::truncated(r#"["a","#)]
#[case::object(r#"{"ids":["a"]}"#)]
#[case::numbers("[1,2,3]")]
#[tokio::test]
async fn test_list_ids_malformed_is_decode_failed(#[case] body: &str) {
    let node = FakeNode::new();
    node.respond_raw(body);
    let client = connected_client(&node).await;

    let err = client.list_merkle_tree_ids().await.expect_err("malformed body");
    assert!(matches!(err, ClientError::DecodeFailed { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_rpc_error_is_query_failed_with_status() {
    let node = FakeNode::new();
    let client = connected_client(&node).await;
    node.fail_queries(tonic::Code::Unavailable, "node restarting");

    let err = client.list_merkle_tree_ids().await.expect_err("rpc error");

    assert!(matches!(err, ClientError::QueryFailed { .. }), "got: {err:?}");
    let source = std::error::Error::source(&err).expect("source kept");
    assert!(source.to_string().contains("node restarting"), "got: {source}");
}

#[tokio::test(start_paused = true)]
async fn test_query_deadline_is_enforced() {
    let node = FakeNode::new();
    let client = connected_client(&node).await;
    node.hang_queries();

    let err = client.get_merkle_tree("abc").await.expect_err("deadline");

    assert!(matches!(err, ClientError::QueryFailed { .. }), "got: {err:?}");
    assert!(err.to_string().contains("deadline"), "got: {err}");
    let source = std::error::Error::source(&err).expect("timeout kept as source");
    assert_eq!(source.to_string(), "timed out after 1s");
}

#[tokio::test]
async fn test_query_errors_do_not_reconnect() {
    let node = FakeNode::new();
    let client = connected_client(&node).await;
    node.fail_queries(tonic::Code::Unavailable, "down");

    for _ in 0..3 {
        assert!(client.list_merkle_tree_ids().await.is_err());
    }

    assert_eq!(client.state(), ConnectionState::Ready);
    assert_eq!(node.dial_count(), 1);

    node.answer_from_store();
    assert!(client.list_merkle_tree_ids().await.is_ok());
}

#[tokio::test]
async fn test_concurrent_queries_share_connection() {
    let node = FakeNode::new();
    node.insert_tree("a", tree("ra", &["x"], ""));
    node.insert_tree("b", tree("rb", &["y"], ""));
    let client = connected_client(&node).await;

    let (a, b, ids) = tokio::join!(
        client.get_merkle_tree("a"),
        client.get_merkle_tree("b"),
        client.list_merkle_tree_ids(),
    );

    assert_eq!(a.unwrap().root, "ra");
    assert_eq!(b.unwrap().root, "rb");
    assert_eq!(ids.unwrap(), vec!["a", "b"]);
    assert_eq!(node.dial_count(), 1);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_close_never_connected_client() {
    let node = FakeNode::new();
    let (mut client, _) = client_for(&node, test_config(1));

    client.close();
    client.close();

    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(node.dial_count(), 0);
}

#[tokio::test]
async fn test_queries_after_close_are_not_connected() {
    let node = FakeNode::new();
    let mut client = connected_client(&node).await;

    client.close();

    assert!(matches!(client.get_merkle_tree("abc").await, Err(ClientError::NotConnected)));
    assert!(matches!(client.list_merkle_tree_ids().await, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_query_before_connect_is_not_connected() {
    let node = FakeNode::new();
    let (client, _) = client_for(&node, test_config(1));

    assert!(matches!(client.list_merkle_tree_ids().await, Err(ClientError::NotConnected)));
    assert!(node.received_queries().is_empty());
}

// ============================================================================
// gRPC Transport Tests
// ============================================================================

#[tokio::test]
async fn test_grpc_unreachable_endpoint_exhausts() {
    // Port 1 on loopback refuses connections on any sane test host.
    let config = ClientConfig::builder()
        .endpoint("127.0.0.1:1")
        .contract_address(TEST_CONTRACT)
        .retry(RetryPolicy::builder().max_retries(1).build())
        .connection_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    let err = MerkleQueryClient::connect_to(config).await.expect_err("nothing listens on port 1");

    let ClientError::ConnectionExhausted { attempts, last_error, .. } = err else {
        panic!("expected ConnectionExhausted, got: {err:?}");
    };
    assert_eq!(attempts, 1);
    assert!(matches!(*last_error, ClientError::DialFailed { .. }), "got: {last_error:?}");
}
