#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::models::{
    AccountRow, AuctionBatch, BlockRow, ContractPackageRow, ContractRow, DeployInfoRow, DeployRow,
    RewardRow, TransferRow,
};
use crate::IndexerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Relational store for indexed entities.
///
/// Every write is keyed by a natural identifier and is safe to repeat.
/// Batch writes (auction snapshots, rewards) commit all rows or none.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn insert_block(&self, row: &BlockRow) -> Result<(), IndexerError>;

    /// Raw payload of a stored block
    async fn get_raw_block(&self, hash: &str) -> Result<Option<String>, IndexerError>;

    /// Set the verified flag. Never cleared once set.
    async fn validate_block(&self, hash: &str) -> Result<(), IndexerError>;

    /// Unverified blocks not checked after `checked_before`. Never-checked
    /// blocks come first, then the least recently checked, then by height.
    async fn unverified_blocks(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, IndexerError>;

    /// Record when a verify pass was last scheduled for or run on a block
    async fn mark_block_checked(&self, hash: &str, at: DateTime<Utc>) -> Result<(), IndexerError>;

    async fn insert_deploy(&self, row: &DeployRow) -> Result<(), IndexerError>;

    /// Rewrite the derived columns of a stored deploy, keeping its raw payload
    async fn update_deploy(&self, row: &DeployRow) -> Result<(), IndexerError>;

    /// Raw payload of a stored deploy
    async fn get_deploy(&self, hash: &str) -> Result<Option<String>, IndexerError>;

    async fn deploys_without_metadata(&self, limit: i64) -> Result<Vec<String>, IndexerError>;

    /// How many of `hashes` have a stored deploy
    async fn count_deploys(&self, hashes: &[String]) -> Result<usize, IndexerError>;

    /// The subset of `hashes` without a stored deploy, in input order
    async fn missing_deploys(&self, hashes: &[String]) -> Result<Vec<String>, IndexerError>;

    /// A placeholder row never replaces a real one
    async fn insert_deploy_info(&self, row: &DeployInfoRow) -> Result<(), IndexerError>;

    async fn insert_transfer(&self, row: &TransferRow) -> Result<(), IndexerError>;

    /// Replace the current auction snapshot
    async fn insert_auction(&self, batch: &AuctionBatch) -> Result<(), IndexerError>;

    /// Replace the snapshot recorded at `block_height`
    async fn insert_auction_era(
        &self,
        block_height: i64,
        batch: &AuctionBatch,
    ) -> Result<(), IndexerError>;

    async fn insert_rewards(&self, rows: &[RewardRow]) -> Result<(), IndexerError>;

    async fn insert_contract(&self, row: &ContractRow) -> Result<(), IndexerError>;

    async fn insert_contract_package(&self, row: &ContractPackageRow) -> Result<(), IndexerError>;

    /// Known public key and purse are kept when the new row lacks them
    async fn upsert_account(&self, row: &AccountRow) -> Result<(), IndexerError>;
}
