//! Configuration for the Merkle query client.
//!
//! [`ClientConfig`] is built once at startup and handed to
//! [`MerkleQueryClient::new`](crate::MerkleQueryClient::new). There is no
//! process-wide mutable default: the `DEFAULT_*` constants below are the
//! values a builder falls back to.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default maximum retries. Non-positive means retry forever.
pub const DEFAULT_MAX_RETRIES: i32 = -1;

/// Default delay the backoff schedule doubles from (30 seconds).
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(30);

/// Default ceiling of the backoff schedule (10 minutes).
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10 * 60);

/// Default bound on each dial and on each verification (10 seconds).
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline attached to every contract query (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint used by [`ClientConfig::from_env`] when `GRPC_URL` is unset.
pub const DEFAULT_ENDPOINT: &str = "0.0.0.0:9090";

/// Contract address used by [`ClientConfig::from_env`] when `CONTRACT_ADDR` is unset.
pub const DEFAULT_CONTRACT_ADDRESS: &str =
    "cosmos1ufs3tlq4umljk0qfe8k5ya0x6hpavn897u2cnf9k0en9jr7qarqqt56709";

/// Environment variable holding the gRPC endpoint.
pub const ENV_GRPC_URL: &str = "GRPC_URL";

/// Environment variable holding the contract address.
pub const ENV_CONTRACT_ADDR: &str = "CONTRACT_ADDR";

/// Reconnection policy for the connect loop.
///
/// The delay after the n-th consecutive failure is
/// `min(initial_backoff * 2^n, max_backoff)`; see [`Backoff`](crate::Backoff).
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Maximum connection attempts. Zero or negative retries forever.
    #[serde(default = "default_max_retries")]
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: i32,

    /// Delay the backoff schedule doubles from.
    #[serde(with = "humantime_serde", default = "default_initial_backoff")]
    #[builder(default = DEFAULT_INITIAL_BACKOFF)]
    pub initial_backoff: Duration,

    /// Ceiling of the backoff schedule.
    #[serde(with = "humantime_serde", default = "default_max_backoff")]
    #[builder(default = DEFAULT_MAX_BACKOFF)]
    pub max_backoff: Duration,
}

fn default_max_retries() -> i32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    DEFAULT_MAX_BACKOFF
}

fn default_connection_timeout() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Returns the attempt limit, or `None` when retries are unbounded.
    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        u32::try_from(self.max_retries).ok().filter(|limit| *limit > 0)
    }

    /// Checks that the backoff ceiling is not below its starting point.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `max_backoff < initial_backoff`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::BelowMinimum {
                field: "max_backoff",
                min: format!("{:?}", self.initial_backoff),
                value: format!("{:?}", self.max_backoff),
            });
        }
        Ok(())
    }
}

/// Configuration for [`MerkleQueryClient`](crate::MerkleQueryClient).
///
/// Immutable once built. Each client owns its own copy; two clients may run
/// with different policies side by side.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use merkle_query::{ClientConfig, RetryPolicy};
///
/// let config = ClientConfig::builder()
///     .endpoint("127.0.0.1:9090")
///     .contract_address("cosmos1contract")
///     .retry(RetryPolicy::builder().max_retries(5).initial_backoff(Duration::from_secs(1)).build())
///     .connection_timeout(Duration::from_secs(5))
///     .build()?;
///
/// assert_eq!(config.retry().limit(), Some(5));
/// # Ok::<(), merkle_query::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Node gRPC endpoint, `host:port` or a full URI.
    pub(crate) endpoint: String,

    /// Bech32 address of the Merkle-tree contract.
    pub(crate) contract_address: String,

    /// Reconnection policy.
    #[serde(default)]
    pub(crate) retry: RetryPolicy,

    /// Bound on each dial and on each verification.
    #[serde(with = "humantime_serde", default = "default_connection_timeout")]
    pub(crate) connection_timeout: Duration,

    /// Deadline attached to every contract query.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub(crate) request_timeout: Duration,
}

#[bon::bon]
impl ClientConfig {
    /// Creates a new configuration, validating all fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `endpoint` or `contract_address` is empty
    /// - `connection_timeout` or `request_timeout` is zero
    /// - the retry policy's `max_backoff` is below its `initial_backoff`
    #[builder]
    pub fn new(
        #[builder(into)] endpoint: String,
        #[builder(into)] contract_address: String,
        #[builder(default)] retry: RetryPolicy,
        #[builder(default = DEFAULT_CONNECTION_TIMEOUT)] connection_timeout: Duration,
        #[builder(default = DEFAULT_REQUEST_TIMEOUT)] request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config =
            Self { endpoint, contract_address, retry, connection_timeout, request_timeout };
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `GRPC_URL` and `CONTRACT_ADDR`.
    ///
    /// Unset variables fall back to [`DEFAULT_ENDPOINT`] and
    /// [`DEFAULT_CONTRACT_ADDRESS`]; everything else takes its default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable resolves to an empty string.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let endpoint = lookup(ENV_GRPC_URL).unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let contract_address =
            lookup(ENV_CONTRACT_ADDR).unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_owned());

        let config = Self::builder().endpoint(endpoint).contract_address(contract_address).build()?;
        tracing::info!(
            endpoint = %config.endpoint,
            contract_address = %config.contract_address,
            "initialized client configuration",
        );
        Ok(config)
    }

    /// Re-checks every field.
    ///
    /// Deserialized configurations bypass the builder, so call this after
    /// loading one from a file.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Empty { field: "endpoint" });
        }
        if self.contract_address.trim().is_empty() {
            return Err(ConfigError::Empty { field: "contract_address" });
        }
        if self.connection_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "connection_timeout",
                value: format!("{:?}", self.connection_timeout),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::MustBePositive {
                field: "request_timeout",
                value: format!("{:?}", self.request_timeout),
            });
        }
        self.retry.validate()
    }

    /// Returns the node endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the contract address.
    #[must_use]
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Returns the reconnection policy.
    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the per-query deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
