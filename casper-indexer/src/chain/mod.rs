pub mod rpc;
#[cfg(any(test, feature = "test-util"))]
pub mod stub;
pub mod types;

pub use rpc::{CasperRpcClient, ChainRpc};
#[cfg(any(test, feature = "test-util"))]
pub use stub::StaticRpc;
pub use types::*;

use crate::IndexerError;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// JSON-RPC method names used by the indexer
pub mod methods {
    pub const GET_BLOCK: &str = "chain_get_block";
    pub const GET_DEPLOY: &str = "info_get_deploy";
    pub const QUERY_GLOBAL_STATE: &str = "query_global_state";
    pub const GET_AUCTION_INFO: &str = "state_get_auction_info";
    pub const GET_ERA_INFO: &str = "chain_get_era_info_by_switch_block";
    pub const GET_ACCOUNT_INFO: &str = "state_get_account_info";
}

/// Global-state key prefixes
pub mod keys {
    pub const DEPLOY: &str = "deploy-";
    pub const TRANSFER: &str = "transfer-";
    pub const HASH: &str = "hash-";
    pub const ACCOUNT_HASH: &str = "account-hash-";

    /// Prefix `id` unless it already carries the prefix
    pub fn with_prefix(prefix: &str, id: &str) -> String {
        if id.starts_with(prefix) {
            id.to_string()
        } else {
            format!("{}{}", prefix, id)
        }
    }
}

/// Decode an RPC `result` into its typed view, keeping the serialized bytes
pub(crate) fn decode_result<T: DeserializeOwned>(
    method: &str,
    result: JsonValue,
) -> Result<(T, Vec<u8>), IndexerError> {
    let raw = serde_json::to_vec(&result)
        .map_err(|e| IndexerError::Parse(format!("{} result: {}", method, e)))?;
    let typed = serde_json::from_value(result)
        .map_err(|e| IndexerError::Parse(format!("{} result: {}", method, e)))?;
    Ok((typed, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_prefix() {
        assert_eq!(keys::with_prefix(keys::TRANSFER, "ab12"), "transfer-ab12");
        assert_eq!(keys::with_prefix(keys::TRANSFER, "transfer-ab12"), "transfer-ab12");
        assert_eq!(keys::with_prefix(keys::HASH, "cc"), "hash-cc");
    }
}
