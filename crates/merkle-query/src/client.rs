//! The resilient query client.
//!
//! [`MerkleQueryClient`] owns at most one connection. [`connect`] drives the
//! [`ConnectionState`] machine until a channel has been dialed **and**
//! verified, sleeping between attempts according to [`Backoff`]. Queries run
//! on the verified connection and never trigger a reconnect on their own:
//! a caller that sees [`ClientError::QueryFailed`] decides whether to call
//! [`connect`] again.
//!
//! [`connect`]: MerkleQueryClient::connect

use fail::fail_point;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::{Backoff, Sleeper, TokioSleeper},
    config::ClientConfig,
    error::{ClientError, Result, TransportError},
    query::{MerkleTree, QueryMsg},
    state::ConnectionState,
    transport::{ContractQuerier, Dialer, GrpcDialer},
};

/// Queries a Merkle-tree contract through one node.
///
/// Generic over the [`Dialer`] producing connections and the [`Sleeper`]
/// used for backoff; [`MerkleQueryClient::new`] picks the gRPC and tokio
/// implementations.
///
/// # Example
///
/// ```no_run
/// use merkle_query::{ClientConfig, MerkleQueryClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder()
///     .endpoint("127.0.0.1:9090")
///     .contract_address("cosmos1contract")
///     .build()?;
///
/// let mut client = MerkleQueryClient::new(config);
/// client.connect().await?;
///
/// for id in client.list_merkle_tree_ids().await? {
///     let tree = client.get_merkle_tree(&id).await?;
///     println!("{id}: root={} leaves={}", tree.root, tree.leaves.len());
/// }
///
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct MerkleQueryClient<D: Dialer = GrpcDialer, S: Sleeper = TokioSleeper> {
    config: ClientConfig,
    dialer: D,
    sleeper: S,
    connection: Option<D::Connection>,
    state: ConnectionState,
}

impl<D: Dialer, S: Sleeper> std::fmt::Debug for MerkleQueryClient<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleQueryClient")
            .field("endpoint", &self.config.endpoint())
            .field("contract_address", &self.config.contract_address())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MerkleQueryClient {
    /// Creates an unconnected client that dials over gRPC.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, GrpcDialer, TokioSleeper)
    }

    /// Creates a gRPC client and connects it.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_to(config: ClientConfig) -> Result<Self> {
        let mut client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }
}

impl<D: Dialer, S: Sleeper> MerkleQueryClient<D, S> {
    /// Creates an unconnected client with explicit transport and sleeper.
    #[must_use]
    pub fn with_transport(config: ClientConfig, dialer: D, sleeper: S) -> Self {
        Self { config, dialer, sleeper, connection: None, state: ConnectionState::Unconnected }
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` once a verified connection is held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_ready() && self.connection.is_some()
    }

    /// Dials and verifies a connection, retrying with backoff.
    ///
    /// Any connection already held is dropped first and the backoff schedule
    /// starts over. With an unbounded retry policy (the default) this only
    /// returns once connected.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionExhausted`] when a positive
    /// `max_retries` is configured and that many attempts failed.
    pub async fn connect(&mut self) -> Result<()> {
        self.connect_with_cancel(&CancellationToken::new()).await
    }

    /// Like [`connect`](Self::connect), but stops when `cancel` fires.
    ///
    /// The token is checked before every dial and raced against each attempt
    /// and each backoff sleep.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionExhausted`] when the retry budget is consumed
    /// - [`ClientError::Cancelled`] when `cancel` fires first
    #[tracing::instrument(
        skip(self, cancel),
        fields(endpoint = %self.config.endpoint(), max_retries = self.config.retry().max_retries)
    )]
    pub async fn connect_with_cancel(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.connection = None;
        self.state = ConnectionState::Unconnected;

        let limit = self.config.retry().limit();
        let mut backoff = Backoff::new(self.config.retry());
        let mut failures: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(failures));
            }

            tracing::info!(attempt = failures + 1, "attempting to connect");

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                outcome = self.attempt() => Some(outcome),
            };
            let err = match outcome {
                None => return Err(self.cancelled(failures)),
                Some(Ok(connection)) => {
                    self.connection = Some(connection);
                    self.state = ConnectionState::Ready;
                    tracing::info!(attempts = failures + 1, "connected and verified");
                    return Ok(());
                },
                Some(Err(err)) => err,
            };

            self.state = ConnectionState::Unconnected;
            failures = failures.saturating_add(1);

            if limit.is_some_and(|limit| failures >= limit) {
                tracing::error!(attempts = failures, error = %err, "connection retries exhausted");
                return Err(ClientError::ConnectionExhausted {
                    endpoint: self.config.endpoint().to_owned(),
                    attempts: failures,
                    last_error: Box::new(err),
                });
            }

            let delay = backoff.next_delay();
            tracing::warn!(
                attempt = failures,
                delay_ms = millis(delay),
                error = %err,
                "connection failed, retrying after backoff",
            );
            fail_point!("connect-before-backoff");

            let interrupted = tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = self.sleeper.sleep(delay) => false,
            };
            if interrupted {
                return Err(self.cancelled(failures));
            }
        }
    }

    /// Releases the connection, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.connection.take().is_some() {
            tracing::info!(endpoint = %self.config.endpoint(), "closed connection");
        }
        self.state = ConnectionState::Closed;
    }

    /// Fetches the tree stored under `id`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] before a successful connect
    /// - [`ClientError::QueryFailed`] if the RPC fails or exceeds the request timeout
    /// - [`ClientError::DecodeFailed`] if the response is not a tree object
    #[tracing::instrument(skip(self), fields(contract = %self.config.contract_address()))]
    pub async fn get_merkle_tree(&self, id: &str) -> Result<MerkleTree> {
        self.smart_query(&QueryMsg::GetMerkleTree { id: id.to_owned() }, "merkle tree").await
    }

    /// Lists every tree id, in contract order.
    ///
    /// # Errors
    ///
    /// Same as [`get_merkle_tree`](Self::get_merkle_tree), with
    /// [`ClientError::DecodeFailed`] if the response is not an array of strings.
    #[tracing::instrument(skip(self), fields(contract = %self.config.contract_address()))]
    pub async fn list_merkle_tree_ids(&self) -> Result<Vec<String>> {
        self.smart_query(&QueryMsg::ListMerkleTreeIds {}, "tree id list").await
    }

    /// One dial + verify pass. The returned connection has passed the probe.
    async fn attempt(&mut self) -> Result<D::Connection> {
        let endpoint = self.config.endpoint().to_owned();
        let timeout = self.config.connection_timeout();

        fail_point!("connect-dial", |_| {
            Err(ClientError::dial_failed(endpoint.clone(), "injected dial failure"))
        });

        self.state = ConnectionState::Dialing;
        let connection = match tokio::time::timeout(timeout, self.dialer.dial(&endpoint, timeout))
            .await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(ClientError::dial_failed_with_source(&endpoint, "dial failed", e));
            },
            Err(_elapsed) => {
                return Err(ClientError::dial_failed_with_source(
                    &endpoint,
                    "dial timed out",
                    TransportError::Timeout(timeout),
                ));
            },
        };

        self.state = ConnectionState::Verifying;
        // On failure the channel is dropped here, never reused.
        self.verify(&connection).await?;
        Ok(connection)
    }

    /// Waits for readiness then probes the contract, both under one timeout.
    async fn verify(&self, connection: &D::Connection) -> Result<()> {
        let endpoint = self.config.endpoint();
        let address = self.config.contract_address();
        let timeout = self.config.connection_timeout();

        let probe = async {
            connection.wait_ready().await.map_err(|e| {
                ClientError::verify_failed_with_source(endpoint, "channel did not become ready", e)
            })?;
            let info = connection.contract_info(address).await.map_err(|e| {
                ClientError::verify_failed_with_source(
                    endpoint,
                    format!("contract probe for {address} failed"),
                    e,
                )
            })?;
            tracing::debug!(code_id = info.code_id, label = %info.label, "contract probe succeeded");
            Ok::<(), ClientError>(())
        };

        match tokio::time::timeout(timeout, probe).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ClientError::verify_failed_with_source(
                endpoint,
                "verification timed out",
                TransportError::Timeout(timeout),
            )),
        }
    }

    async fn smart_query<T: DeserializeOwned>(
        &self,
        msg: &QueryMsg,
        expected: &'static str,
    ) -> Result<T> {
        let connection = match (&self.connection, self.state) {
            (Some(connection), ConnectionState::Ready) => connection,
            _ => return Err(ClientError::NotConnected),
        };
        let query = msg
            .to_bytes()
            .map_err(|e| ClientError::query_failed_with_source("failed to encode query", e))?;
        let timeout = self.config.request_timeout();

        let data = match tokio::time::timeout(
            timeout,
            connection.smart_contract_state(self.config.contract_address(), query),
        )
        .await
        {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "smart contract query failed");
                return Err(ClientError::query_failed_with_source("smart contract query failed", e));
            },
            Err(_elapsed) => {
                return Err(ClientError::query_failed_with_source(
                    "query deadline exceeded",
                    TransportError::Timeout(timeout),
                ));
            },
        };

        tracing::debug!(bytes = data.len(), "received contract response");
        serde_json::from_slice(&data).map_err(|e| ClientError::decode_failed(expected, e))
    }

    fn cancelled(&mut self, failures: u32) -> ClientError {
        self.state = ConnectionState::Unconnected;
        tracing::info!(attempts = failures, "connect cancelled");
        ClientError::Cancelled { attempts: failures }
    }
}

/// Milliseconds of `delay` for log fields, saturating at `u64::MAX`.
fn millis(delay: std::time::Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
