//! Transport seam between the client and a chain node.
//!
//! [`Dialer`] opens connections; the connection it yields implements
//! [`ContractQuerier`]. The client only talks to these traits, so the connect
//! loop and both queries can be exercised against an in-process fake (see
//! the `testutil` feature) as well as a real node over gRPC.
//!
//! [`GrpcDialer`] is the production implementation: a plaintext tonic
//! [`Channel`] calling the wasmd `cosmwasm.wasm.v1.Query` service.

use std::time::Duration;

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

use crate::{
    error::TransportError,
    proto::{
        CONTRACT_INFO_PATH, ContractInfo, QueryContractInfoRequest, QueryContractInfoResponse,
        QuerySmartContractStateRequest, QuerySmartContractStateResponse,
        SMART_CONTRACT_STATE_PATH,
    },
};

/// Opens connections to a node endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// The connection type produced by a successful dial.
    type Connection: ContractQuerier;

    /// Opens a connection to `endpoint`, giving up after `timeout`.
    async fn dial(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self::Connection, TransportError>;
}

/// Read-only contract queries over an open connection.
#[async_trait]
pub trait ContractQuerier: Send + Sync {
    /// Resolves once the channel can carry requests.
    async fn wait_ready(&self) -> Result<(), TransportError>;

    /// Fetches metadata of the contract at `address`.
    ///
    /// Fails with a `NotFound` status when the node does not know the contract.
    async fn contract_info(&self, address: &str) -> Result<ContractInfo, TransportError>;

    /// Sends `query` to the contract at `address` and returns the raw response.
    async fn smart_contract_state(
        &self,
        address: &str,
        query: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Dials plaintext gRPC channels with tonic.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcDialer;

/// Prefixes `http://` when `endpoint` carries no scheme.
pub(crate) fn endpoint_uri(endpoint: &str) -> String {
    if endpoint.contains("://") { endpoint.to_owned() } else { format!("http://{endpoint}") }
}

#[async_trait]
impl Dialer for GrpcDialer {
    type Connection = GrpcConnection;

    async fn dial(&self, endpoint: &str, timeout: Duration) -> Result<GrpcConnection, TransportError> {
        let uri = endpoint_uri(endpoint);
        let channel = Endpoint::from_shared(uri)
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                message: e.to_string(),
            })?
            .connect_timeout(timeout)
            .connect()
            .await?;

        Ok(GrpcConnection { channel })
    }
}

/// A verified-or-verifying tonic channel to one node.
///
/// Cloning is cheap and clones share the underlying HTTP/2 connection.
#[derive(Debug, Clone)]
pub struct GrpcConnection {
    channel: Channel,
}

impl GrpcConnection {
    async fn unary<Req, Resp>(&self, request: Req, path: &'static str) -> Result<Resp, TransportError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await?;

        let codec = tonic::codec::ProstCodec::default();
        let response = grpc
            .unary(tonic::Request::new(request), PathAndQuery::from_static(path), codec)
            .await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl ContractQuerier for GrpcConnection {
    async fn wait_ready(&self) -> Result<(), TransportError> {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready().await?;
        Ok(())
    }

    async fn contract_info(&self, address: &str) -> Result<ContractInfo, TransportError> {
        let request = QueryContractInfoRequest { address: address.to_owned() };
        let response: QueryContractInfoResponse = self.unary(request, CONTRACT_INFO_PATH).await?;

        response.contract_info.ok_or_else(|| {
            TransportError::Status(tonic::Status::not_found(format!(
                "no contract info for {address}"
            )))
        })
    }

    async fn smart_contract_state(
        &self,
        address: &str,
        query: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let request =
            QuerySmartContractStateRequest { address: address.to_owned(), query_data: query };
        let response: QuerySmartContractStateResponse =
            self.unary(request, SMART_CONTRACT_STATE_PATH).await?;
        Ok(response.data)
    }
}
