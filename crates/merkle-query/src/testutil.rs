//! In-process fakes for testing code that uses [`MerkleQueryClient`].
//!
//! [`FakeNode`] stands in for a chain node: it implements [`Dialer`] and the
//! connections it hands out implement [`ContractQuerier`], answering the two
//! Merkle-tree queries from an in-memory store. Failures can be scripted per
//! stage (dial, readiness, probe, query). [`RecordingSleeper`] replaces
//! real backoff sleeps and records each requested delay.
//!
//! Feature-gated behind `testutil`:
//!
//! ```toml
//! [dev-dependencies]
//! merkle-query = { path = "../merkle-query", features = ["testutil"] }
//! ```
//!
//! [`MerkleQueryClient`]: crate::MerkleQueryClient

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    backoff::Sleeper,
    config::{ClientConfig, RetryPolicy},
    error::TransportError,
    proto::ContractInfo,
    query::{MerkleTree, QueryMsg},
    transport::{ContractQuerier, Dialer},
};

/// Contract address the fake node knows by default.
pub const TEST_CONTRACT: &str = "cosmos1testmerklecontract";

/// Endpoint used by [`test_config`].
pub const TEST_ENDPOINT: &str = "fake-node:9090";

/// Builds a config aimed at a [`FakeNode`], with the given retry limit and
/// millisecond-scale backoff.
///
/// # Panics
///
/// Panics if the builder rejects the values (it does not for any `max_retries`).
pub fn test_config(max_retries: i32) -> ClientConfig {
    ClientConfig::builder()
        .endpoint(TEST_ENDPOINT)
        .contract_address(TEST_CONTRACT)
        .retry(
            RetryPolicy::builder()
                .max_retries(max_retries)
                .initial_backoff(Duration::from_millis(10))
                .max_backoff(Duration::from_millis(80))
                .build(),
        )
        .connection_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(1))
        .build()
        .expect("valid test config")
}

/// How a scripted query responds.
#[derive(Debug, Clone)]
enum QueryScript {
    /// Answer from the stored trees.
    Store,
    /// Return these bytes for every query.
    Raw(Vec<u8>),
    /// Fail every query with this status.
    Fail(tonic::Code, String),
    /// Never answer.
    Hang,
}

#[derive(Debug)]
struct NodeState {
    contracts: Vec<String>,
    trees: HashMap<String, MerkleTree>,
    tree_order: Vec<String>,
    dial_failures: u32,
    ready_failures: u32,
    probe_failures: u32,
    hang_dials: bool,
    query: QueryScript,
    dial_count: u32,
    probed: Vec<String>,
    queries: Vec<QueryMsg>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            contracts: vec![TEST_CONTRACT.to_owned()],
            trees: HashMap::new(),
            tree_order: Vec::new(),
            dial_failures: 0,
            ready_failures: 0,
            probe_failures: 0,
            hang_dials: false,
            query: QueryScript::Store,
            dial_count: 0,
            probed: Vec::new(),
            queries: Vec::new(),
        }
    }
}

/// Counts down a scripted failure budget, returning `true` while it lasts.
fn take_failure(budget: &mut u32) -> bool {
    if *budget == 0 {
        return false;
    }
    if *budget != u32::MAX {
        *budget -= 1;
    }
    true
}

/// A fake chain node. Clones share state, so a test can keep one handle and
/// hand another to the client.
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    state: Arc<Mutex<NodeState>>,
}

impl FakeNode {
    /// Creates a node serving [`TEST_CONTRACT`] with no trees.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `tree` under `id`. Ids list in insertion order.
    pub fn insert_tree(&self, id: impl Into<String>, tree: MerkleTree) {
        let id = id.into();
        let mut state = self.state.lock();
        if state.trees.insert(id.clone(), tree).is_none() {
            state.tree_order.push(id);
        }
    }

    /// Replaces the set of contract addresses the probe accepts.
    pub fn set_contracts<I, A>(&self, addresses: I)
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.state.lock().contracts = addresses.into_iter().map(Into::into).collect();
    }

    /// Makes the next `count` dials fail. `u32::MAX` fails forever.
    pub fn fail_dials(&self, count: u32) {
        self.state.lock().dial_failures = count;
    }

    /// Makes the next `count` readiness waits fail. `u32::MAX` fails forever.
    pub fn fail_readiness(&self, count: u32) {
        self.state.lock().ready_failures = count;
    }

    /// Makes the next `count` contract probes fail. `u32::MAX` fails forever.
    pub fn fail_probes(&self, count: u32) {
        self.state.lock().probe_failures = count;
    }

    /// Makes every dial hang until the caller's timeout fires.
    pub fn hang_dials(&self) {
        self.state.lock().hang_dials = true;
    }

    /// Answers every query with `bytes` verbatim.
    pub fn respond_raw(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().query = QueryScript::Raw(bytes.into());
    }

    /// Fails every query with a gRPC status.
    pub fn fail_queries(&self, code: tonic::Code, message: impl Into<String>) {
        self.state.lock().query = QueryScript::Fail(code, message.into());
    }

    /// Makes every query hang until the caller's deadline fires.
    pub fn hang_queries(&self) {
        self.state.lock().query = QueryScript::Hang;
    }

    /// Restores normal query answers from the tree store.
    pub fn answer_from_store(&self) {
        self.state.lock().query = QueryScript::Store;
    }

    /// Number of dials attempted, successful or not.
    #[must_use]
    pub fn dial_count(&self) -> u32 {
        self.state.lock().dial_count
    }

    /// Addresses passed to the contract probe, in order.
    #[must_use]
    pub fn probed_addresses(&self) -> Vec<String> {
        self.state.lock().probed.clone()
    }

    /// Decoded queries received, in order.
    #[must_use]
    pub fn received_queries(&self) -> Vec<QueryMsg> {
        self.state.lock().queries.clone()
    }
}

#[async_trait]
impl Dialer for FakeNode {
    type Connection = FakeConnection;

    async fn dial(&self, endpoint: &str, timeout: Duration) -> Result<FakeConnection, TransportError> {
        let hang = {
            let mut state = self.state.lock();
            state.dial_count += 1;
            if take_failure(&mut state.dial_failures) {
                return Err(TransportError::Status(tonic::Status::unavailable(format!(
                    "connection refused: {endpoint}"
                ))));
            }
            state.hang_dials
        };
        if hang {
            tokio::time::sleep(timeout * 2).await;
            return Err(TransportError::Timeout(timeout));
        }
        Ok(FakeConnection { state: Arc::clone(&self.state) })
    }
}

/// A connection handed out by [`FakeNode`].
#[derive(Debug, Clone)]
pub struct FakeConnection {
    state: Arc<Mutex<NodeState>>,
}

impl FakeConnection {
    fn answer(state: &NodeState, msg: &QueryMsg) -> Result<Vec<u8>, TransportError> {
        let encoded = match msg {
            QueryMsg::GetMerkleTree { id } => match state.trees.get(id) {
                Some(tree) => serde_json::to_vec(tree),
                None => {
                    return Err(TransportError::Status(tonic::Status::not_found(format!(
                        "tree {id} not found"
                    ))));
                },
            },
            QueryMsg::ListMerkleTreeIds {} => serde_json::to_vec(&state.tree_order),
        };
        encoded.map_err(|e| TransportError::Status(tonic::Status::internal(e.to_string())))
    }
}

#[async_trait]
impl ContractQuerier for FakeConnection {
    async fn wait_ready(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if take_failure(&mut state.ready_failures) {
            return Err(TransportError::Status(tonic::Status::unavailable(
                "channel stuck in transient failure",
            )));
        }
        Ok(())
    }

    async fn contract_info(&self, address: &str) -> Result<ContractInfo, TransportError> {
        let mut state = self.state.lock();
        state.probed.push(address.to_owned());
        if take_failure(&mut state.probe_failures) {
            return Err(TransportError::Status(tonic::Status::unavailable("node still syncing")));
        }
        if !state.contracts.iter().any(|known| known == address) {
            return Err(TransportError::Status(tonic::Status::not_found(format!(
                "no such contract: {address}"
            ))));
        }
        Ok(ContractInfo {
            code_id: 1,
            creator: "cosmos1creator".into(),
            label: "merkle-trees".into(),
            ..Default::default()
        })
    }

    async fn smart_contract_state(
        &self,
        address: &str,
        query: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let script = {
            let mut state = self.state.lock();
            if !state.contracts.iter().any(|known| known == address) {
                return Err(TransportError::Status(tonic::Status::not_found(format!(
                    "no such contract: {address}"
                ))));
            }
            let msg: QueryMsg = serde_json::from_slice(&query).map_err(|e| {
                TransportError::Status(tonic::Status::invalid_argument(e.to_string()))
            })?;
            state.queries.push(msg.clone());
            match &state.query {
                QueryScript::Store => return Self::answer(&state, &msg),
                other => other.clone(),
            }
        };

        match script {
            QueryScript::Raw(bytes) => Ok(bytes),
            QueryScript::Fail(code, message) => {
                Err(TransportError::Status(tonic::Status::new(code, message)))
            },
            QueryScript::Hang | QueryScript::Store => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout(Duration::MAX))
            },
        }
    }
}

/// A [`Sleeper`] that returns immediately and records every delay.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        tokio::task::yield_now().await;
    }
}
