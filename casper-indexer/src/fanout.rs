//! Dependency fan-out: which child tasks each parent produces.
//!
//! The child lists are pure functions of the parent's parsed result so the
//! graph can be checked without a queue. `enqueue_all` hands them over and
//! stops at the first failure.

use crate::chain::{BlockResult, DeployInfoResult};
use crate::parsing::block::{is_era_end, referenced_hashes};
use crate::parsing::deploy::ParsedDeploy;
use crate::queue::TaskQueue;
use crate::tasks::Task;
use crate::IndexerError;
use tracing::debug;

/// Era tasks first when the block closes an era, then one Deploy-raw and one
/// DeployInfo-raw per transfer hash and per deploy hash
pub fn block_children(result: &BlockResult) -> Vec<Task> {
    let block = &result.block;
    let header = &block.header;
    let hashes = referenced_hashes(&block.body);
    let mut children = Vec::with_capacity(hashes.len() * 2 + 2);

    if is_era_end(result) {
        children.push(Task::Reward {
            block_hash: block.hash.clone(),
        });
        children.push(Task::AuctionEra {
            block_height: header.height,
        });
    }

    for hash in hashes {
        children.push(Task::DeployRaw {
            deploy_hash: hash.clone(),
        });
        children.push(Task::DeployInfoRaw {
            deploy_hash: hash,
            block_hash: block.hash.clone(),
            state_root_hash: header.state_root_hash.clone(),
            deploy_timestamp: header.timestamp.clone(),
        });
    }

    children
}

pub fn deploy_children(parsed: &ParsedDeploy) -> Vec<Task> {
    let mut children = vec![Task::Account {
        public_key: parsed.row.account.clone(),
    }];
    children.extend(contract_tasks(parsed));
    children.extend(contract_package_tasks(parsed));
    children
}

/// Reprocessing only re-drives what a newer rule may have found
pub fn deploy_known_children(parsed: &ParsedDeploy) -> Vec<Task> {
    let mut children = contract_package_tasks(parsed);
    children.extend(contract_tasks(parsed));
    children
}

fn contract_tasks(parsed: &ParsedDeploy) -> Vec<Task> {
    parsed
        .contracts
        .iter()
        .map(|hash| Task::ContractRaw {
            contract_hash: hash.clone(),
            deploy_hash: parsed.row.hash.clone(),
            from: parsed.row.account.clone(),
        })
        .collect()
}

fn contract_package_tasks(parsed: &ParsedDeploy) -> Vec<Task> {
    parsed
        .contract_packages
        .iter()
        .map(|hash| Task::ContractPackageRaw {
            contract_package_hash: hash.clone(),
            deploy_hash: parsed.row.hash.clone(),
            from: parsed.row.account.clone(),
        })
        .collect()
}

pub fn deploy_info_children(
    result: &DeployInfoResult,
    deploy_hash: &str,
    block_hash: &str,
    state_root_hash: &str,
    deploy_timestamp: &str,
) -> Vec<Task> {
    result
        .stored_value
        .deploy_info
        .transfers
        .iter()
        .map(|transfer| Task::TransferRaw {
            transfer_hash: transfer.clone(),
            block_hash: block_hash.to_string(),
            deploy_hash: deploy_hash.to_string(),
            state_root_hash: state_root_hash.to_string(),
            deploy_timestamp: deploy_timestamp.to_string(),
        })
        .collect()
}

pub fn transfer_children(from: &str, to: Option<&str>) -> Vec<Task> {
    std::iter::once(from)
        .chain(to)
        .map(|hash| Task::AccountHash {
            account_hash: hash.to_string(),
        })
        .collect()
}

pub fn verify_children(missing: &[String]) -> Vec<Task> {
    missing
        .iter()
        .map(|hash| Task::DeployRaw {
            deploy_hash: hash.clone(),
        })
        .collect()
}

/// Enqueue in order. The first failure aborts the rest and surfaces as an
/// `Enqueue` error.
pub async fn enqueue_all(queue: &dyn TaskQueue, tasks: Vec<Task>) -> Result<usize, IndexerError> {
    let total = tasks.len();
    for task in tasks {
        queue.enqueue(&task).await.map_err(|e| match e {
            IndexerError::Enqueue(_) => e,
            other => IndexerError::Enqueue(format!(
                "{} on {}: {}",
                task.kind(),
                task.queue(),
                other
            )),
        })?;
        crate::metrics::TASKS_ENQUEUED
            .with_label_values(&[task.kind().name()])
            .inc();
    }
    if total > 0 {
        debug!("Enqueued {} child tasks", total);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{block_json, deploy_info_json, deploy_json, transfer_session};
    use crate::parsing::deploy::parse_deploy;
    use crate::queue::MemoryQueue;
    use crate::tasks::{Queue, TaskKind};
    use serde_json::json;

    fn block(deploys: &[&str], transfers: &[&str], era_end: bool) -> BlockResult {
        serde_json::from_value(block_json(100, "b100", deploys, transfers, era_end)).unwrap()
    }

    fn count(tasks: &[Task], kind: TaskKind) -> usize {
        tasks.iter().filter(|t| t.kind() == kind).count()
    }

    #[test]
    fn test_block_fan_out_counts() {
        let children = block_children(&block(&["d1", "d2", "d3"], &["t1", "t2"], false));
        assert_eq!(children.len(), 10);
        assert_eq!(count(&children, TaskKind::DeployRaw), 5);
        assert_eq!(count(&children, TaskKind::DeployInfoRaw), 5);
        assert_eq!(count(&children, TaskKind::Reward), 0);
        assert_eq!(count(&children, TaskKind::AuctionEra), 0);
    }

    #[test]
    fn test_block_fan_out_carries_block_context() {
        let children = block_children(&block(&["d1"], &[], false));
        assert_eq!(
            children,
            vec![
                Task::DeployRaw {
                    deploy_hash: "d1".into()
                },
                Task::DeployInfoRaw {
                    deploy_hash: "d1".into(),
                    block_hash: "b100".into(),
                    state_root_hash: "root-100".into(),
                    deploy_timestamp: "2021-04-01T12:00:00.000Z".into(),
                },
            ]
        );
    }

    #[test]
    fn test_era_end_block() {
        let children = block_children(&block(&[], &[], true));
        assert_eq!(
            children,
            vec![
                Task::Reward {
                    block_hash: "b100".into()
                },
                Task::AuctionEra { block_height: 100 },
            ]
        );
    }

    #[test]
    fn test_deploy_fan_out() {
        let transforms = json!([
            { "key": "hash-c1", "transform": "WriteContract" },
            { "key": "hash-p1", "transform": "WriteContractPackage" }
        ]);
        let json = deploy_json("d1", "01aa", transfer_session(), transforms, None);
        let raw = serde_json::to_vec(&json).unwrap();
        let parsed = parse_deploy(&serde_json::from_value(json).unwrap(), &raw).unwrap();

        let children = deploy_children(&parsed);
        assert_eq!(
            children,
            vec![
                Task::Account {
                    public_key: "01aa".into()
                },
                Task::ContractRaw {
                    contract_hash: "c1".into(),
                    deploy_hash: "d1".into(),
                    from: "01aa".into()
                },
                Task::ContractPackageRaw {
                    contract_package_hash: "p1".into(),
                    deploy_hash: "d1".into(),
                    from: "01aa".into()
                },
            ]
        );

        let known = deploy_known_children(&parsed);
        assert_eq!(known.len(), 2);
        assert_eq!(known[0].kind(), TaskKind::ContractPackageRaw);
        assert!(known.iter().all(|t| t.queue() == Queue::Contracts));
    }

    #[test]
    fn test_deploy_info_fan_out() {
        let result: DeployInfoResult =
            serde_json::from_value(deploy_info_json("d1", "10", &["transfer-t1", "transfer-t2"]))
                .unwrap();
        let children = deploy_info_children(&result, "d1", "b100", "root-100", "ts");
        assert_eq!(children.len(), 2);
        assert_eq!(
            children[1],
            Task::TransferRaw {
                transfer_hash: "transfer-t2".into(),
                block_hash: "b100".into(),
                deploy_hash: "d1".into(),
                state_root_hash: "root-100".into(),
                deploy_timestamp: "ts".into(),
            }
        );
    }

    #[test]
    fn test_transfer_fan_out() {
        assert_eq!(transfer_children("aa", Some("bb")).len(), 2);
        assert_eq!(
            transfer_children("aa", None),
            vec![Task::AccountHash {
                account_hash: "aa".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_enqueue_all_stops_at_first_failure() {
        let queue = MemoryQueue::new();
        queue.fail_after(1);

        let tasks = verify_children(&["d1".to_string(), "d2".to_string(), "d3".to_string()]);
        let err = enqueue_all(&queue, tasks).await.unwrap_err();

        assert!(matches!(err, IndexerError::Enqueue(_)));
        assert_eq!(queue.len(), 1);
    }
}
