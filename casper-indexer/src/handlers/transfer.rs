use super::HandlerContext;
use crate::fanout::{enqueue_all, transfer_children};
use crate::parsing::transfer::{account_hashes, parse_transfer, TransferContext};
use crate::IndexerError;
use tracing::debug;

pub async fn handle_transfer_raw(
    ctx: &HandlerContext,
    transfer: TransferContext<'_>,
) -> Result<(), IndexerError> {
    let (result, raw) = ctx
        .rpc
        .get_transfer(transfer.state_root_hash, transfer.transfer_hash)
        .await?;
    let row = parse_transfer(&result, &raw, transfer)?;

    ctx.store.insert_transfer(&row).await?;

    let (from, to) = account_hashes(&result);
    if to.is_none() {
        debug!(
            "Transfer {} has no receiving account",
            transfer.transfer_hash
        );
    }
    enqueue_all(ctx.queue.as_ref(), transfer_children(&from, to.as_deref())).await?;
    Ok(())
}
