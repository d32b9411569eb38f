//! JSON messages exchanged with the Merkle-tree contract.
//!
//! Requests are externally tagged: one top-level key naming the query and an
//! object holding its parameters.
//!
//! ```text
//! {"get_merkle_tree":{"id":"abc"}}
//! {"list_merkle_tree_ids":{}}
//! ```

use serde::{Deserialize, Serialize};

/// A query understood by the Merkle-tree contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    /// Fetch one tree by id.
    GetMerkleTree {
        /// Tree identifier.
        id: String,
    },
    /// List the ids of every stored tree.
    ListMerkleTreeIds {},
}

impl QueryMsg {
    /// Serializes the query into the bytes sent as `query_data`.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; with these variants this does not occur
    /// in practice.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// A Merkle tree as stored by the contract.
///
/// The client does not check `root` against `leaves`; that is the
/// contract's job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MerkleTree {
    /// Root hash.
    pub root: String,
    /// Leaf hashes in tree order.
    #[serde(default)]
    pub leaves: Vec<String>,
    /// Opaque metadata string.
    #[serde(default)]
    pub metadata: String,
}
