use super::keys::{self, with_prefix};
use super::methods;
use super::types::{
    AccountResult, AuctionResult, BlockResult, DeployInfoResult, DeployResult, EraInfoResult,
    StoredValueResult, TransferResult,
};
use super::decode_result;
use crate::IndexerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Read access to the chain.
///
/// Every fetch returns the typed result plus the bytes of the node's result
/// object, which end up in the raw payload columns.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn get_block(&self, height: u64) -> Result<(BlockResult, Vec<u8>), IndexerError>;

    async fn get_deploy(&self, hash: &str) -> Result<(DeployResult, Vec<u8>), IndexerError>;

    async fn get_deploy_info(
        &self,
        state_root_hash: &str,
        deploy_hash: &str,
    ) -> Result<(DeployInfoResult, Vec<u8>), IndexerError>;

    async fn get_transfer(
        &self,
        state_root_hash: &str,
        transfer_hash: &str,
    ) -> Result<(TransferResult, Vec<u8>), IndexerError>;

    async fn get_auction(&self) -> Result<AuctionResult, IndexerError>;

    async fn get_auction_era(&self, block_height: u64) -> Result<AuctionResult, IndexerError>;

    async fn get_era_info(&self, block_hash: &str)
        -> Result<(EraInfoResult, Vec<u8>), IndexerError>;

    async fn get_stored_value(
        &self,
        key: &str,
    ) -> Result<(StoredValueResult, Vec<u8>), IndexerError>;

    async fn get_account(&self, public_key: &str)
        -> Result<(AccountResult, Vec<u8>), IndexerError>;
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<JsonValue>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC client for a Casper node
pub struct CasperRpcClient {
    http: reqwest::Client,
    url: url::Url,
    next_id: AtomicU64,
}

impl CasperRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, IndexerError> {
        let url = url::Url::parse(rpc_url)
            .map_err(|e| IndexerError::Config(format!("Invalid RPC url {}: {}", rpc_url, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<JsonValue>,
    ) -> Result<(T, Vec<u8>), IndexerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            body["params"] = params;
        }

        debug!("RPC {} (id {})", method, id);

        let response = self.http.post(self.url.clone()).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(IndexerError::Fetch(format!(
                "{} returned HTTP {}",
                method,
                response.status()
            )));
        }

        let envelope: RpcEnvelope = response.json().await?;

        if let Some(err) = envelope.error {
            return Err(IndexerError::Fetch(format!(
                "{} failed: {} (code {})",
                method, err.message, err.code
            )));
        }

        let result = envelope
            .result
            .ok_or_else(|| IndexerError::Fetch(format!("{} returned no result", method)))?;

        decode_result(method, result)
    }

    async fn query_global_state<T: DeserializeOwned>(
        &self,
        state_root_hash: Option<&str>,
        key: &str,
    ) -> Result<(T, Vec<u8>), IndexerError> {
        let mut params = json!({ "key": key, "path": [] });
        if let Some(state_root_hash) = state_root_hash {
            params["state_identifier"] = json!({ "StateRootHash": state_root_hash });
        }
        self.call(methods::QUERY_GLOBAL_STATE, Some(params)).await
    }
}

#[async_trait]
impl ChainRpc for CasperRpcClient {
    async fn get_block(&self, height: u64) -> Result<(BlockResult, Vec<u8>), IndexerError> {
        self.call(
            methods::GET_BLOCK,
            Some(json!({ "block_identifier": { "Height": height } })),
        )
        .await
    }

    async fn get_deploy(&self, hash: &str) -> Result<(DeployResult, Vec<u8>), IndexerError> {
        self.call(methods::GET_DEPLOY, Some(json!({ "deploy_hash": hash })))
            .await
    }

    async fn get_deploy_info(
        &self,
        state_root_hash: &str,
        deploy_hash: &str,
    ) -> Result<(DeployInfoResult, Vec<u8>), IndexerError> {
        let key = with_prefix(keys::DEPLOY, deploy_hash);
        self.query_global_state(Some(state_root_hash), &key).await
    }

    async fn get_transfer(
        &self,
        state_root_hash: &str,
        transfer_hash: &str,
    ) -> Result<(TransferResult, Vec<u8>), IndexerError> {
        let key = with_prefix(keys::TRANSFER, transfer_hash);
        self.query_global_state(Some(state_root_hash), &key).await
    }

    async fn get_auction(&self) -> Result<AuctionResult, IndexerError> {
        let (result, _) = self.call(methods::GET_AUCTION_INFO, None).await?;
        Ok(result)
    }

    async fn get_auction_era(&self, block_height: u64) -> Result<AuctionResult, IndexerError> {
        let (result, _) = self
            .call(
                methods::GET_AUCTION_INFO,
                Some(json!({ "block_identifier": { "Height": block_height } })),
            )
            .await?;
        Ok(result)
    }

    async fn get_era_info(
        &self,
        block_hash: &str,
    ) -> Result<(EraInfoResult, Vec<u8>), IndexerError> {
        self.call(
            methods::GET_ERA_INFO,
            Some(json!({ "block_identifier": { "Hash": block_hash } })),
        )
        .await
    }

    async fn get_stored_value(
        &self,
        key: &str,
    ) -> Result<(StoredValueResult, Vec<u8>), IndexerError> {
        self.query_global_state(None, key).await
    }

    async fn get_account(
        &self,
        public_key: &str,
    ) -> Result<(AccountResult, Vec<u8>), IndexerError> {
        self.call(
            methods::GET_ACCOUNT_INFO,
            Some(json!({ "public_key": public_key })),
        )
        .await
    }
}
