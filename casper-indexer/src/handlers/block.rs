use super::HandlerContext;
use crate::fanout::{block_children, enqueue_all, verify_children};
use crate::metrics::BLOCKS_VERIFIED;
use crate::parsing::block::{parse_block, parse_stored_block, referenced_hashes};
use crate::queue::TaskQueue;
use crate::store::IndexStore;
use crate::tasks::Task;
use crate::IndexerError;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

pub async fn handle_block_raw(ctx: &HandlerContext, block_height: u64) -> Result<(), IndexerError> {
    let (result, raw) = ctx.rpc.get_block(block_height).await?;
    let row = parse_block(&result, &raw)?;

    ctx.store.insert_block(&row).await?;

    let children = enqueue_all(ctx.queue.as_ref(), block_children(&result)).await?;
    debug!(
        "Indexed block {} at height {} ({} children)",
        row.hash, block_height, children
    );
    Ok(())
}

/// Unverified -> Verified once every referenced deploy is stored. Until then
/// the missing deploys are re-enqueued and the block stays unverified.
pub async fn handle_block_verify(
    ctx: &HandlerContext,
    block_hash: &str,
) -> Result<(), IndexerError> {
    let raw = ctx
        .store
        .get_raw_block(block_hash)
        .await?
        .ok_or_else(|| IndexerError::persist(format!("block {} is not stored", block_hash)))?;
    let block = parse_stored_block(&raw)?;

    let mut seen = HashSet::new();
    let hashes: Vec<String> = referenced_hashes(&block.block.body)
        .into_iter()
        .filter(|h| seen.insert(h.clone()))
        .collect();

    if !hashes.is_empty() {
        let stored = ctx.store.count_deploys(&hashes).await?;
        if stored != hashes.len() {
            let missing = ctx.store.missing_deploys(&hashes).await?;
            info!(
                "Block {} has {}/{} deploys, re-enqueueing {}",
                block_hash,
                stored,
                hashes.len(),
                missing.len()
            );
            enqueue_all(ctx.queue.as_ref(), verify_children(&missing)).await?;
            ctx.store.mark_block_checked(block_hash, Utc::now()).await?;
            return Ok(());
        }
    }

    ctx.store.validate_block(block_hash).await?;
    BLOCKS_VERIFIED.inc();
    debug!("Block {} verified", block_hash);
    Ok(())
}

/// Enqueue a verify task for up to `limit` unverified blocks. Blocks checked
/// within the last `recheck` are skipped so that blocks which never complete
/// cannot hold the whole batch.
pub async fn enqueue_unverified(
    store: &dyn IndexStore,
    queue: &dyn TaskQueue,
    limit: i64,
    recheck: Duration,
) -> Result<usize, IndexerError> {
    let now = Utc::now();
    let recheck = chrono::Duration::from_std(recheck)
        .map_err(|e| IndexerError::Config(format!("recheck interval: {}", e)))?;
    let blocks = store.unverified_blocks(now - recheck, limit).await?;

    let tasks = blocks
        .iter()
        .map(|block_hash| Task::BlockVerify {
            block_hash: block_hash.clone(),
        })
        .collect();
    let count = enqueue_all(queue, tasks).await?;

    for block_hash in &blocks {
        store.mark_block_checked(block_hash, now).await?;
    }
    Ok(count)
}
