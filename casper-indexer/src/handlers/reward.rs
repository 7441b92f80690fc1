use super::HandlerContext;
use crate::parsing::reward::parse_rewards;
use crate::IndexerError;
use tracing::info;

pub async fn handle_reward(ctx: &HandlerContext, block_hash: &str) -> Result<(), IndexerError> {
    let (result, _) = ctx.rpc.get_era_info(block_hash).await?;
    let rows = parse_rewards(&result, block_hash)?;

    ctx.store.insert_rewards(&rows).await?;

    info!(
        "Stored {} rewards for switch block {}",
        rows.len(),
        block_hash
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StaticRpc;
    use crate::fixtures::era_info_json;
    use crate::handlers::test_support::harness;
    use serde_json::json;

    #[tokio::test]
    async fn test_reward_upsert() {
        let rpc = StaticRpc::new().with_era_info(
            "b200",
            era_info_json(
                "b200",
                13,
                json!([
                    { "Validator": { "validator_public_key": "01v1", "amount": "500" } },
                    { "Delegator": {
                        "delegator_public_key": "01d1",
                        "validator_public_key": "01v1",
                        "amount": "50"
                    } }
                ]),
            ),
        );
        let h = harness(rpc);

        handle_reward(&h.ctx, "b200").await.unwrap();
        handle_reward(&h.ctx, "b200").await.unwrap();

        assert_eq!(h.store.rewards().len(), 2);
    }
}
