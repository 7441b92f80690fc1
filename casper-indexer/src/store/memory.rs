//! In-memory storage backend.
//!
//! Same upsert semantics as the PostgreSQL store, without a database.
//! All data is lost when the process exits.

use super::IndexStore;
use crate::models::{
    AccountRow, AuctionBatch, BidRow, BlockRow, ContractPackageRow, ContractRow, DelegatorRow,
    DeployInfoRow, DeployRow, RewardRow, TransferRow,
};
use crate::parsing::deploy_info::ERROR_PAYLOAD;
use crate::IndexerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    blocks: HashMap<String, BlockRow>,
    verified: HashSet<String>,
    checked: HashMap<String, DateTime<Utc>>,
    deploys: HashMap<String, DeployRow>,
    deploy_infos: HashMap<String, DeployInfoRow>,
    transfers: HashMap<String, TransferRow>,
    auction: AuctionBatch,
    auction_eras: BTreeMap<i64, AuctionBatch>,
    rewards: HashMap<(i64, String, String), RewardRow>,
    contracts: HashMap<String, ContractRow>,
    contract_packages: HashMap<String, ContractPackageRow>,
    accounts: HashMap<String, AccountRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, IndexerError> {
        self.tables
            .lock()
            .map_err(|_| IndexerError::persist("memory store poisoned"))
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Option<T> {
        self.tables.lock().ok().map(|t| f(&t))
    }

    pub fn block(&self, hash: &str) -> Option<BlockRow> {
        self.read(|t| t.blocks.get(hash).cloned()).flatten()
    }

    pub fn block_count(&self) -> usize {
        self.read(|t| t.blocks.len()).unwrap_or(0)
    }

    pub fn is_verified(&self, hash: &str) -> bool {
        self.read(|t| t.verified.contains(hash)).unwrap_or(false)
    }

    pub fn deploy(&self, hash: &str) -> Option<DeployRow> {
        self.read(|t| t.deploys.get(hash).cloned()).flatten()
    }

    pub fn deploy_count(&self) -> usize {
        self.read(|t| t.deploys.len()).unwrap_or(0)
    }

    pub fn deploy_info(&self, hash: &str) -> Option<DeployInfoRow> {
        self.read(|t| t.deploy_infos.get(hash).cloned()).flatten()
    }

    pub fn deploy_info_count(&self) -> usize {
        self.read(|t| t.deploy_infos.len()).unwrap_or(0)
    }

    pub fn transfer(&self, hash: &str) -> Option<TransferRow> {
        self.read(|t| t.transfers.get(hash).cloned()).flatten()
    }

    pub fn bids(&self) -> Vec<BidRow> {
        self.read(|t| t.auction.bids.clone()).unwrap_or_default()
    }

    pub fn delegators(&self) -> Vec<DelegatorRow> {
        self.read(|t| t.auction.delegators.clone()).unwrap_or_default()
    }

    pub fn auction_era(&self, block_height: i64) -> Option<AuctionBatch> {
        self.read(|t| t.auction_eras.get(&block_height).cloned())
            .flatten()
    }

    pub fn rewards(&self) -> Vec<RewardRow> {
        self.read(|t| t.rewards.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contract(&self, hash: &str) -> Option<ContractRow> {
        self.read(|t| t.contracts.get(hash).cloned()).flatten()
    }

    pub fn contract_package(&self, hash: &str) -> Option<ContractPackageRow> {
        self.read(|t| t.contract_packages.get(hash).cloned())
            .flatten()
    }

    pub fn account(&self, account_hash: &str) -> Option<AccountRow> {
        self.read(|t| t.accounts.get(account_hash).cloned())
            .flatten()
    }

    pub fn account_count(&self) -> usize {
        self.read(|t| t.accounts.len()).unwrap_or(0)
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn insert_block(&self, row: &BlockRow) -> Result<(), IndexerError> {
        self.lock()?.blocks.insert(row.hash.clone(), row.clone());
        Ok(())
    }

    async fn get_raw_block(&self, hash: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.lock()?.blocks.get(hash).map(|b| b.raw.clone()))
    }

    async fn validate_block(&self, hash: &str) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        if tables.blocks.contains_key(hash) {
            tables.verified.insert(hash.to_string());
        }
        Ok(())
    }

    async fn unverified_blocks(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, IndexerError> {
        let tables = self.lock()?;
        let mut blocks: Vec<(Option<DateTime<Utc>>, i64, &String)> = tables
            .blocks
            .values()
            .filter(|b| !tables.verified.contains(&b.hash))
            .map(|b| (tables.checked.get(&b.hash).copied(), b.height, &b.hash))
            .filter(|(checked, _, _)| checked.map_or(true, |at| at <= checked_before))
            .collect();
        blocks.sort();
        Ok(blocks
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|(_, _, hash)| hash.clone())
            .collect())
    }

    async fn mark_block_checked(&self, hash: &str, at: DateTime<Utc>) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        if tables.blocks.contains_key(hash) && !tables.verified.contains(hash) {
            tables.checked.insert(hash.to_string(), at);
        }
        Ok(())
    }

    async fn insert_deploy(&self, row: &DeployRow) -> Result<(), IndexerError> {
        self.lock()?.deploys.insert(row.hash.clone(), row.clone());
        Ok(())
    }

    async fn update_deploy(&self, row: &DeployRow) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.deploys.get_mut(&row.hash) {
            let raw = std::mem::take(&mut existing.raw);
            *existing = DeployRow {
                raw,
                ..row.clone()
            };
        }
        Ok(())
    }

    async fn get_deploy(&self, hash: &str) -> Result<Option<String>, IndexerError> {
        Ok(self.lock()?.deploys.get(hash).map(|d| d.raw.clone()))
    }

    async fn deploys_without_metadata(&self, limit: i64) -> Result<Vec<String>, IndexerError> {
        let tables = self.lock()?;
        let mut deploys: Vec<&DeployRow> = tables
            .deploys
            .values()
            .filter(|d| d.metadata_type.is_empty())
            .collect();
        deploys.sort_by_key(|d| d.timestamp);
        Ok(deploys
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|d| d.hash.clone())
            .collect())
    }

    async fn count_deploys(&self, hashes: &[String]) -> Result<usize, IndexerError> {
        let tables = self.lock()?;
        let unique: HashSet<&String> = hashes.iter().collect();
        Ok(unique
            .into_iter()
            .filter(|h| tables.deploys.contains_key(*h))
            .count())
    }

    async fn missing_deploys(&self, hashes: &[String]) -> Result<Vec<String>, IndexerError> {
        let tables = self.lock()?;
        Ok(hashes
            .iter()
            .filter(|h| !tables.deploys.contains_key(*h))
            .cloned()
            .collect())
    }

    async fn insert_deploy_info(&self, row: &DeployInfoRow) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        let keep_existing = row.raw == ERROR_PAYLOAD
            && tables
                .deploy_infos
                .get(&row.deploy_hash)
                .map_or(false, |existing| existing.raw != ERROR_PAYLOAD);
        if !keep_existing {
            tables
                .deploy_infos
                .insert(row.deploy_hash.clone(), row.clone());
        }
        Ok(())
    }

    async fn insert_transfer(&self, row: &TransferRow) -> Result<(), IndexerError> {
        self.lock()?
            .transfers
            .insert(row.transfer_hash.clone(), row.clone());
        Ok(())
    }

    async fn insert_auction(&self, batch: &AuctionBatch) -> Result<(), IndexerError> {
        self.lock()?.auction = batch.clone();
        Ok(())
    }

    async fn insert_auction_era(
        &self,
        block_height: i64,
        batch: &AuctionBatch,
    ) -> Result<(), IndexerError> {
        self.lock()?.auction_eras.insert(block_height, batch.clone());
        Ok(())
    }

    async fn insert_rewards(&self, rows: &[RewardRow]) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        for row in rows {
            tables.rewards.insert(
                (row.era_id, row.recipient.clone(), row.validator.clone()),
                row.clone(),
            );
        }
        Ok(())
    }

    async fn insert_contract(&self, row: &ContractRow) -> Result<(), IndexerError> {
        self.lock()?.contracts.insert(row.hash.clone(), row.clone());
        Ok(())
    }

    async fn insert_contract_package(&self, row: &ContractPackageRow) -> Result<(), IndexerError> {
        self.lock()?
            .contract_packages
            .insert(row.hash.clone(), row.clone());
        Ok(())
    }

    async fn upsert_account(&self, row: &AccountRow) -> Result<(), IndexerError> {
        let mut tables = self.lock()?;
        let merged = match tables.accounts.get(&row.account_hash) {
            Some(existing) => AccountRow {
                public_key: row.public_key.clone().or_else(|| existing.public_key.clone()),
                main_purse: row.main_purse.clone().or_else(|| existing.main_purse.clone()),
                ..row.clone()
            },
            None => row.clone(),
        };
        tables.accounts.insert(row.account_hash.clone(), merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::deploy_info::error_row;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn block(hash: &str, height: i64) -> BlockRow {
        BlockRow {
            hash: hash.to_string(),
            parent_hash: String::new(),
            state_root_hash: String::new(),
            era_id: 1,
            height,
            timestamp: Utc.with_ymd_and_hms(2021, 4, 1, 12, 0, 0).unwrap(),
            era_end: false,
            proposer: None,
            deploy_count: 0,
            transfer_count: 0,
            raw: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_block_upsert_and_validation() {
        let store = MemoryStore::new();
        store.insert_block(&block("b2", 2)).await.unwrap();
        store.insert_block(&block("b1", 1)).await.unwrap();
        store.insert_block(&block("b1", 1)).await.unwrap();
        assert_eq!(store.block_count(), 2);

        let now = Utc::now();
        assert_eq!(store.unverified_blocks(now, 10).await.unwrap(), vec!["b1", "b2"]);
        store.validate_block("b1").await.unwrap();
        assert!(store.is_verified("b1"));
        assert_eq!(store.unverified_blocks(now, 10).await.unwrap(), vec!["b2"]);

        // re-inserting a verified block keeps it verified
        store.insert_block(&block("b1", 1)).await.unwrap();
        assert!(store.is_verified("b1"));
    }

    #[tokio::test]
    async fn test_checked_blocks_rotate_behind_unchecked() {
        let store = MemoryStore::new();
        for (hash, height) in [("b1", 1), ("b2", 2), ("b3", 3)] {
            store.insert_block(&block(hash, height)).await.unwrap();
        }
        let t0 = Utc.with_ymd_and_hms(2021, 4, 1, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2021, 4, 1, 12, 1, 0).unwrap();
        store.mark_block_checked("b1", t1).await.unwrap();
        store.mark_block_checked("b2", t0).await.unwrap();

        // b1 and b2 checked after the cutoff, only b3 is due
        let cutoff = Utc.with_ymd_and_hms(2021, 4, 1, 11, 0, 0).unwrap();
        assert_eq!(store.unverified_blocks(cutoff, 2).await.unwrap(), vec!["b3"]);

        assert_eq!(
            store.unverified_blocks(t1, 10).await.unwrap(),
            vec!["b3", "b2", "b1"]
        );
    }

    #[tokio::test]
    async fn test_placeholder_never_replaces_real_deploy_info() {
        let store = MemoryStore::new();
        let mut real = error_row("d1", "b1");
        real.raw = "{}".to_string();
        real.gas = Decimal::from(5);

        store.insert_deploy_info(&error_row("d1", "b1")).await.unwrap();
        store.insert_deploy_info(&real).await.unwrap();
        store.insert_deploy_info(&error_row("d1", "b1")).await.unwrap();

        assert_eq!(store.deploy_info_count(), 1);
        assert_eq!(store.deploy_info("d1").unwrap().gas, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_account_hash_upsert_keeps_public_key() {
        let store = MemoryStore::new();
        store
            .upsert_account(&AccountRow {
                account_hash: "aa".into(),
                public_key: Some("01aa".into()),
                main_purse: Some("uref-1".into()),
                raw: "{}".into(),
            })
            .await
            .unwrap();
        store
            .upsert_account(&AccountRow {
                account_hash: "aa".into(),
                public_key: None,
                main_purse: None,
                raw: "{\"v\":2}".into(),
            })
            .await
            .unwrap();

        let account = store.account("aa").unwrap();
        assert_eq!(account.public_key.as_deref(), Some("01aa"));
        assert_eq!(account.main_purse.as_deref(), Some("uref-1"));
        assert_eq!(account.raw, "{\"v\":2}");
    }
}
