use super::HandlerContext;
use crate::fanout::{deploy_info_children, enqueue_all};
use crate::metrics::DEPLOY_INFO_FALLBACKS;
use crate::parsing::deploy_info::{error_row, parse_deploy_info};
use crate::IndexerError;
use tracing::warn;

/// On a fetch failure a placeholder row is stored and the failure is still
/// returned, so the task is retried and counted as failed.
pub async fn handle_deploy_info_raw(
    ctx: &HandlerContext,
    deploy_hash: &str,
    block_hash: &str,
    state_root_hash: &str,
    deploy_timestamp: &str,
) -> Result<(), IndexerError> {
    let (result, raw) = match ctx.rpc.get_deploy_info(state_root_hash, deploy_hash).await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(
                "Deploy info for {} unavailable, storing placeholder: {}",
                deploy_hash, e
            );
            ctx.store
                .insert_deploy_info(&error_row(deploy_hash, block_hash))
                .await?;
            DEPLOY_INFO_FALLBACKS.inc();
            return Err(e);
        }
    };

    let row = parse_deploy_info(&result, &raw, block_hash, deploy_timestamp)?;
    ctx.store.insert_deploy_info(&row).await?;

    let children = deploy_info_children(
        &result,
        deploy_hash,
        block_hash,
        state_root_hash,
        deploy_timestamp,
    );
    enqueue_all(ctx.queue.as_ref(), children).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StaticRpc;
    use crate::fixtures::deploy_info_json;
    use crate::handlers::test_support::harness;
    use crate::tasks::TaskKind;
    use rust_decimal::Decimal;

    const TS: &str = "2021-04-01T12:00:00.000Z";

    #[tokio::test]
    async fn test_deploy_info_fans_out_transfers() {
        let rpc = StaticRpc::new().with_global_state(
            "deploy-d1",
            deploy_info_json("d1", "12345", &["transfer-t1", "transfer-t2"]),
        );
        let h = harness(rpc);

        handle_deploy_info_raw(&h.ctx, "d1", "b100", "root-100", TS)
            .await
            .unwrap();

        let row = h.store.deploy_info("d1").unwrap();
        assert_eq!(row.gas, Decimal::from(12345));
        assert_eq!(row.source, "uref-aa-007");
        assert_eq!(h.queue.count(TaskKind::TransferRaw), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_placeholder() {
        let h = harness(StaticRpc::new());

        let err = handle_deploy_info_raw(&h.ctx, "d1", "b100", "root-100", TS)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Fetch(_)));

        assert_eq!(h.store.deploy_info_count(), 1);
        let row = h.store.deploy_info("d1").unwrap();
        assert_eq!(row.from, "");
        assert_eq!(row.source, "");
        assert_eq!(row.gas, Decimal::ZERO);
        assert_eq!(row.raw, "\"ERROR\"");
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_replaces_placeholder() {
        let h = harness(StaticRpc::new());
        let _ = handle_deploy_info_raw(&h.ctx, "d1", "b100", "root-100", TS).await;

        h.rpc
            .insert("query_global_state", "deploy-d1", deploy_info_json("d1", "7", &[]));
        handle_deploy_info_raw(&h.ctx, "d1", "b100", "root-100", TS)
            .await
            .unwrap();

        assert_eq!(h.store.deploy_info_count(), 1);
        assert_eq!(h.store.deploy_info("d1").unwrap().gas, Decimal::from(7));
    }

    #[tokio::test]
    async fn test_non_numeric_gas_stores_nothing() {
        let rpc = StaticRpc::new()
            .with_global_state("deploy-d1", deploy_info_json("d1", "n/a", &["transfer-t1"]));
        let h = harness(rpc);

        let err = handle_deploy_info_raw(&h.ctx, "d1", "b100", "root-100", TS)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Parse(_)));
        assert_eq!(h.store.deploy_info_count(), 0);
        assert!(h.queue.is_empty());
    }
}
