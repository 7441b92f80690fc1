use super::keys::{self, with_prefix};
use super::methods;
use super::rpc::ChainRpc;
use super::types::{
    AccountResult, AuctionResult, BlockResult, DeployInfoResult, DeployResult, EraInfoResult,
    StoredValueResult, TransferResult,
};
use super::decode_result;
use crate::IndexerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// Chain client answering from canned `result` objects.
///
/// Responses are keyed by method and by the identifier the call carries:
/// block height, deploy hash, global-state key, block hash or public key.
/// A missing entry is a `Fetch` error, like a node that does not know the key.
#[derive(Default)]
pub struct StaticRpc {
    responses: Mutex<HashMap<(String, String), JsonValue>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StaticRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, method: &str, id: impl Into<String>, result: JsonValue) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert((method.to_string(), id.into()), result);
        }
    }

    pub fn remove(&self, method: &str, id: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.remove(&(method.to_string(), id.to_string()));
        }
    }

    pub fn with_block(self, height: u64, result: JsonValue) -> Self {
        self.insert(methods::GET_BLOCK, height.to_string(), result);
        self
    }

    pub fn with_deploy(self, hash: &str, result: JsonValue) -> Self {
        self.insert(methods::GET_DEPLOY, hash, result);
        self
    }

    /// Answer `query_global_state` for `key`, whatever the state root
    pub fn with_global_state(self, key: &str, result: JsonValue) -> Self {
        self.insert(methods::QUERY_GLOBAL_STATE, key, result);
        self
    }

    pub fn with_auction(self, result: JsonValue) -> Self {
        self.insert(methods::GET_AUCTION_INFO, "", result);
        self
    }

    pub fn with_auction_at(self, height: u64, result: JsonValue) -> Self {
        self.insert(methods::GET_AUCTION_INFO, height.to_string(), result);
        self
    }

    pub fn with_era_info(self, block_hash: &str, result: JsonValue) -> Self {
        self.insert(methods::GET_ERA_INFO, block_hash, result);
        self
    }

    pub fn with_account(self, public_key: &str, result: JsonValue) -> Self {
        self.insert(methods::GET_ACCOUNT_INFO, public_key, result);
        self
    }

    /// Every call made so far as `(method, id)`
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }

    fn respond<T: DeserializeOwned>(
        &self,
        method: &str,
        id: &str,
    ) -> Result<(T, Vec<u8>), IndexerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((method.to_string(), id.to_string()));
        }

        let result = self
            .responses
            .lock()
            .map_err(|_| IndexerError::Fetch("static rpc poisoned".to_string()))?
            .get(&(method.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| IndexerError::Fetch(format!("{} has no result for {}", method, id)))?;

        decode_result(method, result)
    }
}

#[async_trait]
impl ChainRpc for StaticRpc {
    async fn get_block(&self, height: u64) -> Result<(BlockResult, Vec<u8>), IndexerError> {
        self.respond(methods::GET_BLOCK, &height.to_string())
    }

    async fn get_deploy(&self, hash: &str) -> Result<(DeployResult, Vec<u8>), IndexerError> {
        self.respond(methods::GET_DEPLOY, hash)
    }

    async fn get_deploy_info(
        &self,
        _state_root_hash: &str,
        deploy_hash: &str,
    ) -> Result<(DeployInfoResult, Vec<u8>), IndexerError> {
        self.respond(
            methods::QUERY_GLOBAL_STATE,
            &with_prefix(keys::DEPLOY, deploy_hash),
        )
    }

    async fn get_transfer(
        &self,
        _state_root_hash: &str,
        transfer_hash: &str,
    ) -> Result<(TransferResult, Vec<u8>), IndexerError> {
        self.respond(
            methods::QUERY_GLOBAL_STATE,
            &with_prefix(keys::TRANSFER, transfer_hash),
        )
    }

    async fn get_auction(&self) -> Result<AuctionResult, IndexerError> {
        let (result, _) = self.respond(methods::GET_AUCTION_INFO, "")?;
        Ok(result)
    }

    async fn get_auction_era(&self, block_height: u64) -> Result<AuctionResult, IndexerError> {
        let (result, _) = self.respond(methods::GET_AUCTION_INFO, &block_height.to_string())?;
        Ok(result)
    }

    async fn get_era_info(
        &self,
        block_hash: &str,
    ) -> Result<(EraInfoResult, Vec<u8>), IndexerError> {
        self.respond(methods::GET_ERA_INFO, block_hash)
    }

    async fn get_stored_value(
        &self,
        key: &str,
    ) -> Result<(StoredValueResult, Vec<u8>), IndexerError> {
        self.respond(methods::QUERY_GLOBAL_STATE, key)
    }

    async fn get_account(
        &self,
        public_key: &str,
    ) -> Result<(AccountResult, Vec<u8>), IndexerError> {
        self.respond(methods::GET_ACCOUNT_INFO, public_key)
    }
}
