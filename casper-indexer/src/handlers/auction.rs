use super::HandlerContext;
use crate::parsing::auction::parse_auction;
use crate::parsing::to_bigint;
use crate::IndexerError;
use tracing::info;

pub async fn handle_auction(ctx: &HandlerContext) -> Result<(), IndexerError> {
    let result = ctx.rpc.get_auction().await?;
    let batch = parse_auction(&result.auction_state)?;

    ctx.store.insert_auction(&batch).await?;

    info!(
        "Stored auction at height {}: {} bids, {} delegators",
        result.auction_state.block_height,
        batch.bids.len(),
        batch.delegators.len()
    );
    Ok(())
}

pub async fn handle_auction_era(
    ctx: &HandlerContext,
    block_height: u64,
) -> Result<(), IndexerError> {
    let result = ctx.rpc.get_auction_era(block_height).await?;
    let batch = parse_auction(&result.auction_state)?;

    ctx.store
        .insert_auction_era(to_bigint("block_height", block_height)?, &batch)
        .await?;

    info!(
        "Stored era auction at height {}: {} bids, {} delegators",
        block_height,
        batch.bids.len(),
        batch.delegators.len()
    );
    Ok(())
}
