//! Protobuf messages for the subset of `cosmwasm.wasm.v1.Query` this crate calls.
//!
//! Field numbers follow `cosmwasm/wasm/v1/query.proto` and `types.proto` from
//! wasmd. Fields the client never reads (`created`, `extension`) are omitted;
//! prost skips unknown fields on decode.

/// gRPC path of the smart-contract state query.
pub const SMART_CONTRACT_STATE_PATH: &str = "/cosmwasm.wasm.v1.Query/SmartContractState";

/// gRPC path of the contract metadata query used as the readiness probe.
pub const CONTRACT_INFO_PATH: &str = "/cosmwasm.wasm.v1.Query/ContractInfo";

/// Request for `Query/SmartContractState`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QuerySmartContractStateRequest {
    /// Contract address.
    #[prost(string, tag = "1")]
    pub address: String,
    /// JSON query passed to the contract.
    #[prost(bytes = "vec", tag = "2")]
    pub query_data: Vec<u8>,
}

/// Response of `Query/SmartContractState`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QuerySmartContractStateResponse {
    /// JSON returned by the contract.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
}

/// Request for `Query/ContractInfo`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryContractInfoRequest {
    /// Contract address.
    #[prost(string, tag = "1")]
    pub address: String,
}

/// Response of `Query/ContractInfo`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct QueryContractInfoResponse {
    /// Contract address.
    #[prost(string, tag = "1")]
    pub address: String,
    /// Contract metadata; absent when the node does not know the contract.
    #[prost(message, optional, tag = "2")]
    pub contract_info: Option<ContractInfo>,
}

/// Metadata of a deployed contract.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct ContractInfo {
    /// Id of the stored wasm code.
    #[prost(uint64, tag = "1")]
    pub code_id: u64,
    /// Address that instantiated the contract.
    #[prost(string, tag = "2")]
    pub creator: String,
    /// Optional admin address.
    #[prost(string, tag = "3")]
    pub admin: String,
    /// Instantiation label.
    #[prost(string, tag = "4")]
    pub label: String,
    /// IBC port, empty for non-IBC contracts.
    #[prost(string, tag = "6")]
    pub ibc_port_id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn test_smart_query_wire_layout() {
        let request = QuerySmartContractStateRequest {
            address: "c".into(),
            query_data: b"{}".to_vec(),
        };
        // field 1 (len-delimited) "c", field 2 (len-delimited) "{}"
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x01, b'c', 0x12, 0x02, b'{', b'}']);
    }

    #[test]
    fn test_contract_info_response_decodes_nested() {
        let response = QueryContractInfoResponse {
            address: "cosmos1contract".into(),
            contract_info: Some(ContractInfo {
                code_id: 7,
                label: "merkle-trees".into(),
                ..Default::default()
            }),
        };
        let decoded = QueryContractInfoResponse::decode(response.encode_to_vec().as_slice()).unwrap();

        assert_eq!(decoded, response);
    }

    #[test]
    fn test_contract_info_skips_unknown_fields() {
        // code_id = 3, then field 5 (`created`, len-delimited, 2 bytes) which we do not model
        let bytes = [0x08, 0x03, 0x2a, 0x02, 0x08, 0x01];
        let info = ContractInfo::decode(bytes.as_slice()).unwrap();

        assert_eq!(info.code_id, 3);
    }
}
