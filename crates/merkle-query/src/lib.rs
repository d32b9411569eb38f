//! Resilient gRPC client for a CosmWasm Merkle-tree contract.
//!
//! This crate provides [`MerkleQueryClient`], which keeps one verified gRPC
//! connection to a Cosmos chain node and answers two read-only queries
//! against a Merkle-tree smart contract:
//!
//! - [`get_merkle_tree`](MerkleQueryClient::get_merkle_tree): one tree by id
//! - [`list_merkle_tree_ids`](MerkleQueryClient::list_merkle_tree_ids): all ids
//!
//! Tree storage, root computation and proof validation live in the contract;
//! the client only forwards JSON queries and decodes JSON answers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MerkleQueryClient                        │
//! │   connect loop (Backoff, Sleeper) │ queries (QueryMsg)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │              Dialer / ContractQuerier traits                │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  GrpcDialer (tonic Channel)  │  FakeNode (testutil)         │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │          cosmwasm.wasm.v1.Query on the chain node           │
//! │      SmartContractState │ ContractInfo (probe)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a reachable chain node.
//! use merkle_query::{ClientConfig, MerkleQueryClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::from_env()?;
//!     let client = MerkleQueryClient::connect_to(config).await?;
//!
//!     let ids = client.list_merkle_tree_ids().await?;
//!     if let Some(id) = ids.first() {
//!         let tree = client.get_merkle_tree(id).await?;
//!         println!("root of {id}: {}", tree.root);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Connection Lifecycle
//!
//! `connect` dials, waits for the channel to become ready, and probes the
//! contract with a `ContractInfo` query. Any failure discards the channel,
//! sleeps according to [`Backoff`], and dials again. The default policy
//! retries forever; a positive `max_retries` bounds the number of attempts
//! and yields [`ClientError::ConnectionExhausted`]. Use
//! [`connect_with_cancel`](MerkleQueryClient::connect_with_cancel) to stop an
//! unbounded loop from outside.
//!
//! Queries never reconnect by themselves.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the [`testutil`] module with a fake node and a recording sleeper.
//! - **`failpoints`**: Activates the `connect-dial` and `connect-before-backoff` fail points.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
mod client;
mod config;
mod error;
pub mod proto;
mod query;
mod state;
/// Shared test utilities: fake node and recording sleeper.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
mod transport;

/// Backoff schedule and sleeping seam.
pub use backoff::{Backoff, Sleeper, TokioSleeper};
/// The query client.
pub use client::MerkleQueryClient;
/// Configuration types and default constants.
pub use config::{
    ClientConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_CONTRACT_ADDRESS, DEFAULT_ENDPOINT,
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT,
    ENV_CONTRACT_ADDR, ENV_GRPC_URL, RetryPolicy,
};
/// Error types and result alias.
pub use error::{BoxError, ClientError, ConfigError, Result, TransportError};
/// Contract probe response.
pub use proto::ContractInfo;
/// Contract query messages and payloads.
pub use query::{MerkleTree, QueryMsg};
/// Connection lifecycle.
pub use state::ConnectionState;
/// Transport seam and its gRPC implementation.
pub use transport::{ContractQuerier, Dialer, GrpcConnection, GrpcDialer};
