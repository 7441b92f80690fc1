use super::HandlerContext;
use crate::fanout::{deploy_children, deploy_known_children, enqueue_all};
use crate::parsing::deploy::{parse_deploy, parse_stored_deploy};
use crate::queue::TaskQueue;
use crate::store::IndexStore;
use crate::tasks::Task;
use crate::IndexerError;
use tracing::{debug, info};

pub async fn handle_deploy_raw(
    ctx: &HandlerContext,
    deploy_hash: &str,
) -> Result<(), IndexerError> {
    let (result, raw) = ctx.rpc.get_deploy(deploy_hash).await?;
    let parsed = parse_deploy(&result, &raw)?;

    ctx.store.insert_deploy(&parsed.row).await?;

    enqueue_all(ctx.queue.as_ref(), deploy_children(&parsed)).await?;
    Ok(())
}

/// Recompute metadata of a stored deploy from its raw payload. Only a deploy
/// that now has metadata is rewritten.
pub async fn handle_deploy_known(
    ctx: &HandlerContext,
    deploy_hash: &str,
) -> Result<(), IndexerError> {
    let raw = ctx
        .store
        .get_deploy(deploy_hash)
        .await?
        .ok_or_else(|| IndexerError::Persist {
            message: format!("deploy {} is not stored", deploy_hash),
            transient: false,
        })?;

    let result = parse_stored_deploy(&raw)?;
    let parsed = parse_deploy(&result, raw.as_bytes())?;

    if parsed.row.metadata_type.is_empty() {
        debug!("Still no metadata for deploy {}", deploy_hash);
        return Ok(());
    }

    info!(
        "New metadata found for {} of type {}",
        deploy_hash, parsed.row.metadata_type
    );
    ctx.store.update_deploy(&parsed.row).await?;

    enqueue_all(ctx.queue.as_ref(), deploy_known_children(&parsed)).await?;
    Ok(())
}

/// Queue a `deploy:known` pass for stored deploys that have no metadata yet
pub async fn enqueue_reprocess(
    store: &dyn IndexStore,
    queue: &dyn TaskQueue,
    limit: i64,
) -> Result<usize, IndexerError> {
    let deploys = store.deploys_without_metadata(limit).await?;
    let tasks = deploys
        .into_iter()
        .map(|deploy_hash| Task::DeployKnown { deploy_hash })
        .collect();
    enqueue_all(queue, tasks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StaticRpc;
    use crate::fixtures::{deploy_json, transfer_session};
    use crate::handlers::test_support::harness;
    use crate::models::DeployRow;
    use crate::tasks::TaskKind;
    use serde_json::json;

    fn contract_transforms() -> serde_json::Value {
        json!([
            { "key": "hash-c1", "transform": "WriteContract" },
            { "key": "hash-p1", "transform": "WriteContractPackage" }
        ])
    }

    #[tokio::test]
    async fn test_deploy_raw() {
        let rpc = StaticRpc::new().with_deploy(
            "d1",
            deploy_json("d1", "01aa", transfer_session(), contract_transforms(), None),
        );
        let h = harness(rpc);

        handle_deploy_raw(&h.ctx, "d1").await.unwrap();

        let row = h.store.deploy("d1").unwrap();
        assert_eq!(row.metadata_type, "transfer");
        assert_eq!(h.queue.count(TaskKind::Account), 1);
        assert_eq!(h.queue.count(TaskKind::ContractRaw), 1);
        assert_eq!(h.queue.count(TaskKind::ContractPackageRaw), 1);
    }

    #[tokio::test]
    async fn test_unexecuted_deploy_stores_nothing() {
        let mut json = deploy_json("d1", "01aa", transfer_session(), json!([]), None);
        json["execution_results"] = json!([]);
        let h = harness(StaticRpc::new().with_deploy("d1", json));

        let err = handle_deploy_raw(&h.ctx, "d1").await.unwrap_err();
        assert!(matches!(err, IndexerError::Fetch(_)));
        assert_eq!(h.store.deploy_count(), 0);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_deploy_known_backfills_metadata() {
        let h = harness(StaticRpc::new());
        let json = deploy_json("d1", "01aa", transfer_session(), contract_transforms(), None);
        let raw = serde_json::to_string(&json).unwrap();

        // stored by an older pass that found no metadata
        let parsed = parse_deploy(&serde_json::from_value(json).unwrap(), raw.as_bytes()).unwrap();
        let stale = DeployRow {
            metadata_type: String::new(),
            metadata: json!({}),
            ..parsed.row
        };
        h.store.insert_deploy(&stale).await.unwrap();

        handle_deploy_known(&h.ctx, "d1").await.unwrap();

        let row = h.store.deploy("d1").unwrap();
        assert_eq!(row.metadata_type, "transfer");
        assert_eq!(row.raw, raw);
        assert_eq!(
            h.queue.drain(),
            vec![
                Task::ContractPackageRaw {
                    contract_package_hash: "p1".into(),
                    deploy_hash: "d1".into(),
                    from: "01aa".into()
                },
                Task::ContractRaw {
                    contract_hash: "c1".into(),
                    deploy_hash: "d1".into(),
                    from: "01aa".into()
                },
            ]
        );
        assert!(h.rpc.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_known_without_metadata_is_noop() {
        let session = json!({ "ModuleBytes": { "module_bytes": "00", "args": [] } });
        let rpc = StaticRpc::new().with_deploy(
            "d1",
            deploy_json("d1", "01aa", session, contract_transforms(), None),
        );
        let h = harness(rpc);
        handle_deploy_raw(&h.ctx, "d1").await.unwrap();
        h.queue.drain();

        handle_deploy_known(&h.ctx, "d1").await.unwrap();
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_deploy_known_missing_row() {
        let h = harness(StaticRpc::new());
        let err = handle_deploy_known(&h.ctx, "nope").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_enqueue_reprocess() {
        let session = json!({ "ModuleBytes": { "module_bytes": "00", "args": [] } });
        let rpc = StaticRpc::new()
            .with_deploy("d1", deploy_json("d1", "01aa", session, json!([]), None))
            .with_deploy("d2", deploy_json("d2", "01aa", transfer_session(), json!([]), None));
        let h = harness(rpc);
        handle_deploy_raw(&h.ctx, "d1").await.unwrap();
        handle_deploy_raw(&h.ctx, "d2").await.unwrap();
        h.queue.drain();

        let count = enqueue_reprocess(h.store.as_ref(), h.queue.as_ref(), 10)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(h.queue.drain(), vec![Task::DeployKnown { deploy_hash: "d1".into() }]);
    }
}
