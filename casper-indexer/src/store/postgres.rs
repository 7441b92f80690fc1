use super::IndexStore;
use crate::models::{
    AccountRow, AuctionBatch, BlockRow, ContractPackageRow, ContractRow, DeployInfoRow, DeployRow,
    RewardRow, TransferRow,
};
use crate::parsing::deploy_info::ERROR_PAYLOAD;
use crate::IndexerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Pool, Transaction};
use tracing::{debug, info};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// PostgreSQL store over a deadpool connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;
        client.batch_execute(SCHEMA).await?;
        info!("Schema is up to date");
        Ok(())
    }

    async fn insert_bids(
        tx: &Transaction<'_>,
        block_height: Option<i64>,
        batch: &AuctionBatch,
    ) -> Result<(), IndexerError> {
        match block_height {
            None => {
                let bid = tx
                    .prepare(
                        r#"
                        INSERT INTO bids
                            (public_key, bonding_purse, staked_amount, delegation_rate, inactive)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (public_key) DO UPDATE
                        SET bonding_purse = EXCLUDED.bonding_purse,
                            staked_amount = EXCLUDED.staked_amount,
                            delegation_rate = EXCLUDED.delegation_rate,
                            inactive = EXCLUDED.inactive
                        "#,
                    )
                    .await?;
                for row in &batch.bids {
                    tx.execute(
                        &bid,
                        &[
                            &row.public_key,
                            &row.bonding_purse,
                            &row.staked_amount,
                            &row.delegation_rate,
                            &row.inactive,
                        ],
                    )
                    .await?;
                }

                let delegator = tx
                    .prepare(
                        r#"
                        INSERT INTO delegators (public_key, delegatee, staked_amount, bonding_purse)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (public_key, delegatee) DO UPDATE
                        SET staked_amount = EXCLUDED.staked_amount,
                            bonding_purse = EXCLUDED.bonding_purse
                        "#,
                    )
                    .await?;
                for row in &batch.delegators {
                    tx.execute(
                        &delegator,
                        &[
                            &row.public_key,
                            &row.delegatee,
                            &row.staked_amount,
                            &row.bonding_purse,
                        ],
                    )
                    .await?;
                }
            }
            Some(height) => {
                let bid = tx
                    .prepare(
                        r#"
                        INSERT INTO era_bids (block_height, public_key, bonding_purse,
                                              staked_amount, delegation_rate, inactive)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        ON CONFLICT (block_height, public_key) DO UPDATE
                        SET bonding_purse = EXCLUDED.bonding_purse,
                            staked_amount = EXCLUDED.staked_amount,
                            delegation_rate = EXCLUDED.delegation_rate,
                            inactive = EXCLUDED.inactive
                        "#,
                    )
                    .await?;
                for row in &batch.bids {
                    tx.execute(
                        &bid,
                        &[
                            &height,
                            &row.public_key,
                            &row.bonding_purse,
                            &row.staked_amount,
                            &row.delegation_rate,
                            &row.inactive,
                        ],
                    )
                    .await?;
                }

                let delegator = tx
                    .prepare(
                        r#"
                        INSERT INTO era_delegators
                            (block_height, public_key, delegatee, staked_amount, bonding_purse)
                        VALUES ($1, $2, $3, $4, $5)
                        ON CONFLICT (block_height, public_key, delegatee) DO UPDATE
                        SET staked_amount = EXCLUDED.staked_amount,
                            bonding_purse = EXCLUDED.bonding_purse
                        "#,
                    )
                    .await?;
                for row in &batch.delegators {
                    tx.execute(
                        &delegator,
                        &[
                            &height,
                            &row.public_key,
                            &row.delegatee,
                            &row.staked_amount,
                            &row.bonding_purse,
                        ],
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl IndexStore for PgStore {
    async fn insert_block(&self, row: &BlockRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO blocks (hash, parent_hash, state_root_hash, era_id, height, "timestamp",
                                    era_end, proposer, deploy_count, transfer_count, raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (hash) DO UPDATE
                SET parent_hash = EXCLUDED.parent_hash,
                    state_root_hash = EXCLUDED.state_root_hash,
                    era_id = EXCLUDED.era_id,
                    height = EXCLUDED.height,
                    "timestamp" = EXCLUDED."timestamp",
                    era_end = EXCLUDED.era_end,
                    proposer = EXCLUDED.proposer,
                    deploy_count = EXCLUDED.deploy_count,
                    transfer_count = EXCLUDED.transfer_count,
                    raw = EXCLUDED.raw
                "#,
                &[
                    &row.hash,
                    &row.parent_hash,
                    &row.state_root_hash,
                    &row.era_id,
                    &row.height,
                    &row.timestamp,
                    &row.era_end,
                    &row.proposer,
                    &row.deploy_count,
                    &row.transfer_count,
                    &row.raw,
                ],
            )
            .await?;

        Ok(())
    }

    async fn get_raw_block(&self, hash: &str) -> Result<Option<String>, IndexerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT raw FROM blocks WHERE hash = $1", &[&hash])
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn validate_block(&self, hash: &str) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE blocks SET verified = TRUE WHERE hash = $1 AND NOT verified",
                &[&hash],
            )
            .await?;
        debug!("Validated block {} ({} rows)", hash, updated);
        Ok(())
    }

    async fn unverified_blocks(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, IndexerError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT hash FROM blocks
                WHERE NOT verified AND (checked_at IS NULL OR checked_at <= $1)
                ORDER BY checked_at NULLS FIRST, height
                LIMIT $2
                "#,
                &[&checked_before, &limit],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn mark_block_checked(&self, hash: &str, at: DateTime<Utc>) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;
        client
            .execute(
                "UPDATE blocks SET checked_at = $2 WHERE hash = $1 AND NOT verified",
                &[&hash, &at],
            )
            .await?;
        Ok(())
    }

    async fn insert_deploy(&self, row: &DeployRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO deploys (hash, account, cost, result, error_message, "timestamp",
                                     block_hash, kind, raw, metadata_type, contract_hash,
                                     contract_name, entry_point, metadata, events)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (hash) DO UPDATE
                SET account = EXCLUDED.account,
                    cost = EXCLUDED.cost,
                    result = EXCLUDED.result,
                    error_message = EXCLUDED.error_message,
                    "timestamp" = EXCLUDED."timestamp",
                    block_hash = EXCLUDED.block_hash,
                    kind = EXCLUDED.kind,
                    raw = EXCLUDED.raw,
                    metadata_type = EXCLUDED.metadata_type,
                    contract_hash = EXCLUDED.contract_hash,
                    contract_name = EXCLUDED.contract_name,
                    entry_point = EXCLUDED.entry_point,
                    metadata = EXCLUDED.metadata,
                    events = EXCLUDED.events
                "#,
                &[
                    &row.hash,
                    &row.account,
                    &row.cost,
                    &row.result,
                    &row.error_message,
                    &row.timestamp,
                    &row.block_hash,
                    &row.kind,
                    &row.raw,
                    &row.metadata_type,
                    &row.contract_hash,
                    &row.contract_name,
                    &row.entry_point,
                    &row.metadata,
                    &row.events,
                ],
            )
            .await?;

        Ok(())
    }

    async fn update_deploy(&self, row: &DeployRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                UPDATE deploys
                SET account = $2,
                    cost = $3,
                    result = $4,
                    error_message = $5,
                    "timestamp" = $6,
                    block_hash = $7,
                    kind = $8,
                    metadata_type = $9,
                    contract_hash = $10,
                    contract_name = $11,
                    entry_point = $12,
                    metadata = $13,
                    events = $14
                WHERE hash = $1
                "#,
                &[
                    &row.hash,
                    &row.account,
                    &row.cost,
                    &row.result,
                    &row.error_message,
                    &row.timestamp,
                    &row.block_hash,
                    &row.kind,
                    &row.metadata_type,
                    &row.contract_hash,
                    &row.contract_name,
                    &row.entry_point,
                    &row.metadata,
                    &row.events,
                ],
            )
            .await?;

        Ok(())
    }

    async fn get_deploy(&self, hash: &str) -> Result<Option<String>, IndexerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT raw FROM deploys WHERE hash = $1", &[&hash])
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn deploys_without_metadata(&self, limit: i64) -> Result<Vec<String>, IndexerError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT hash FROM deploys
                WHERE metadata_type = ''
                ORDER BY "timestamp"
                LIMIT $1
                "#,
                &[&limit],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn count_deploys(&self, hashes: &[String]) -> Result<usize, IndexerError> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) FROM deploys WHERE hash = ANY($1)",
                &[&hashes],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn missing_deploys(&self, hashes: &[String]) -> Result<Vec<String>, IndexerError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT t.hash
                FROM unnest($1::text[]) WITH ORDINALITY AS t(hash, ord)
                WHERE NOT EXISTS (SELECT 1 FROM deploys d WHERE d.hash = t.hash)
                ORDER BY t.ord
                "#,
                &[&hashes],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn insert_deploy_info(&self, row: &DeployInfoRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO deploy_infos
                    (deploy_hash, block_hash, "from", source, gas, transfers, "timestamp", raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (deploy_hash) DO UPDATE
                SET block_hash = EXCLUDED.block_hash,
                    "from" = EXCLUDED."from",
                    source = EXCLUDED.source,
                    gas = EXCLUDED.gas,
                    transfers = EXCLUDED.transfers,
                    "timestamp" = EXCLUDED."timestamp",
                    raw = EXCLUDED.raw
                WHERE EXCLUDED.raw <> $9 OR deploy_infos.raw = $9
                "#,
                &[
                    &row.deploy_hash,
                    &row.block_hash,
                    &row.from,
                    &row.source,
                    &row.gas,
                    &row.transfers,
                    &row.timestamp,
                    &row.raw,
                    &ERROR_PAYLOAD,
                ],
            )
            .await?;

        Ok(())
    }

    async fn insert_transfer(&self, row: &TransferRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO transfers (transfer_hash, block_hash, deploy_hash, state_root_hash,
                                       "from", "to", source, target, amount, gas, transfer_id,
                                       "timestamp", raw)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (transfer_hash) DO UPDATE
                SET block_hash = EXCLUDED.block_hash,
                    deploy_hash = EXCLUDED.deploy_hash,
                    state_root_hash = EXCLUDED.state_root_hash,
                    "from" = EXCLUDED."from",
                    "to" = EXCLUDED."to",
                    source = EXCLUDED.source,
                    target = EXCLUDED.target,
                    amount = EXCLUDED.amount,
                    gas = EXCLUDED.gas,
                    transfer_id = EXCLUDED.transfer_id,
                    "timestamp" = EXCLUDED."timestamp",
                    raw = EXCLUDED.raw
                "#,
                &[
                    &row.transfer_hash,
                    &row.block_hash,
                    &row.deploy_hash,
                    &row.state_root_hash,
                    &row.from,
                    &row.to,
                    &row.source,
                    &row.target,
                    &row.amount,
                    &row.gas,
                    &row.transfer_id,
                    &row.timestamp,
                    &row.raw,
                ],
            )
            .await?;

        Ok(())
    }

    async fn insert_auction(&self, batch: &AuctionBatch) -> Result<(), IndexerError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute("DELETE FROM delegators", &[]).await?;
        tx.execute("DELETE FROM bids", &[]).await?;
        Self::insert_bids(&tx, None, batch).await?;

        tx.commit().await?;
        debug!(
            "Stored auction snapshot: {} bids, {} delegators",
            batch.bids.len(),
            batch.delegators.len()
        );
        Ok(())
    }

    async fn insert_auction_era(
        &self,
        block_height: i64,
        batch: &AuctionBatch,
    ) -> Result<(), IndexerError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            "DELETE FROM era_delegators WHERE block_height = $1",
            &[&block_height],
        )
        .await?;
        tx.execute(
            "DELETE FROM era_bids WHERE block_height = $1",
            &[&block_height],
        )
        .await?;
        Self::insert_bids(&tx, Some(block_height), batch).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_rewards(&self, rows: &[RewardRow]) -> Result<(), IndexerError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let stmt = tx
            .prepare(
                r#"
                INSERT INTO rewards (era_id, recipient, validator, block_hash, is_delegator, amount)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (era_id, recipient, validator) DO UPDATE
                SET block_hash = EXCLUDED.block_hash,
                    is_delegator = EXCLUDED.is_delegator,
                    amount = EXCLUDED.amount
                "#,
            )
            .await?;
        for row in rows {
            tx.execute(
                &stmt,
                &[
                    &row.era_id,
                    &row.recipient,
                    &row.validator,
                    &row.block_hash,
                    &row.is_delegator,
                    &row.amount,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_contract(&self, row: &ContractRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO contracts (hash, contract_package_hash, deploy_hash, "from", raw)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (hash) DO UPDATE
                SET contract_package_hash = EXCLUDED.contract_package_hash,
                    deploy_hash = EXCLUDED.deploy_hash,
                    "from" = EXCLUDED."from",
                    raw = EXCLUDED.raw
                "#,
                &[
                    &row.hash,
                    &row.contract_package_hash,
                    &row.deploy_hash,
                    &row.from,
                    &row.raw,
                ],
            )
            .await?;

        Ok(())
    }

    async fn insert_contract_package(&self, row: &ContractPackageRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO contract_packages (hash, deploy_hash, "from", raw)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (hash) DO UPDATE
                SET deploy_hash = EXCLUDED.deploy_hash,
                    "from" = EXCLUDED."from",
                    raw = EXCLUDED.raw
                "#,
                &[&row.hash, &row.deploy_hash, &row.from, &row.raw],
            )
            .await?;

        Ok(())
    }

    async fn upsert_account(&self, row: &AccountRow) -> Result<(), IndexerError> {
        let client = self.pool.get().await?;

        client
            .execute(
                r#"
                INSERT INTO accounts (account_hash, public_key, main_purse, raw)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (account_hash) DO UPDATE
                SET public_key = COALESCE(EXCLUDED.public_key, accounts.public_key),
                    main_purse = COALESCE(EXCLUDED.main_purse, accounts.main_purse),
                    raw = EXCLUDED.raw
                "#,
                &[&row.account_hash, &row.public_key, &row.main_purse, &row.raw],
            )
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_postgres::{Config, Runtime};
    use tokio_postgres::NoTls;

    #[tokio::test]
    #[ignore] // Requires PostgreSQL running
    async fn test_migrate_and_count() {
        let mut cfg = Config::new();
        cfg.url = Some("postgres://postgres@localhost/casper_test".to_string());
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls).unwrap();
        let store = PgStore::new(pool);

        store.migrate().await.unwrap();
        store.migrate().await.unwrap();

        let hashes = vec!["no-such-deploy".to_string()];
        assert_eq!(store.count_deploys(&hashes).await.unwrap(), 0);
        assert_eq!(store.missing_deploys(&hashes).await.unwrap(), hashes);
    }
}
