//! Task registry: every kind of work item, the queue it lives on and its payload.
//!
//! Payloads are flat and carry every identifier their handler needs, so a
//! task can run on any worker without state from the task that produced it.

use crate::IndexerError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unit of work as it travels through the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Task {
    #[serde(rename = "block:raw")]
    BlockRaw { block_height: u64 },
    #[serde(rename = "block:verify")]
    BlockVerify { block_hash: String },
    #[serde(rename = "deploy:raw")]
    DeployRaw { deploy_hash: String },
    #[serde(rename = "deploy:known")]
    DeployKnown { deploy_hash: String },
    #[serde(rename = "deployinfo:raw")]
    DeployInfoRaw {
        deploy_hash: String,
        block_hash: String,
        state_root_hash: String,
        deploy_timestamp: String,
    },
    #[serde(rename = "transfer:raw")]
    TransferRaw {
        transfer_hash: String,
        block_hash: String,
        deploy_hash: String,
        state_root_hash: String,
        deploy_timestamp: String,
    },
    #[serde(rename = "contract:raw")]
    ContractRaw {
        contract_hash: String,
        deploy_hash: String,
        from: String,
    },
    #[serde(rename = "contractPackage:raw")]
    ContractPackageRaw {
        contract_package_hash: String,
        deploy_hash: String,
        from: String,
    },
    #[serde(rename = "reward:raw")]
    Reward { block_hash: String },
    #[serde(rename = "auction:raw")]
    Auction,
    #[serde(rename = "auctionEra:raw")]
    AuctionEra { block_height: u64 },
    #[serde(rename = "account:publicKey")]
    Account { public_key: String },
    #[serde(rename = "account:hash")]
    AccountHash { account_hash: String },
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::BlockRaw { .. } => TaskKind::BlockRaw,
            Task::BlockVerify { .. } => TaskKind::BlockVerify,
            Task::DeployRaw { .. } => TaskKind::DeployRaw,
            Task::DeployKnown { .. } => TaskKind::DeployKnown,
            Task::DeployInfoRaw { .. } => TaskKind::DeployInfoRaw,
            Task::TransferRaw { .. } => TaskKind::TransferRaw,
            Task::ContractRaw { .. } => TaskKind::ContractRaw,
            Task::ContractPackageRaw { .. } => TaskKind::ContractPackageRaw,
            Task::Reward { .. } => TaskKind::Reward,
            Task::Auction => TaskKind::Auction,
            Task::AuctionEra { .. } => TaskKind::AuctionEra,
            Task::Account { .. } => TaskKind::Account,
            Task::AccountHash { .. } => TaskKind::AccountHash,
        }
    }

    pub fn queue(&self) -> Queue {
        self.kind().queue()
    }

    pub fn to_json(&self) -> Result<String, IndexerError> {
        serde_json::to_string(self).map_err(|e| IndexerError::Payload(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, IndexerError> {
        serde_json::from_str(json).map_err(|e| IndexerError::Payload(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    BlockRaw,
    BlockVerify,
    DeployRaw,
    DeployKnown,
    DeployInfoRaw,
    TransferRaw,
    ContractRaw,
    ContractPackageRaw,
    Reward,
    Auction,
    AuctionEra,
    Account,
    AccountHash,
}

impl TaskKind {
    pub const ALL: [TaskKind; 13] = [
        TaskKind::BlockRaw,
        TaskKind::BlockVerify,
        TaskKind::DeployRaw,
        TaskKind::DeployKnown,
        TaskKind::DeployInfoRaw,
        TaskKind::TransferRaw,
        TaskKind::ContractRaw,
        TaskKind::ContractPackageRaw,
        TaskKind::Reward,
        TaskKind::Auction,
        TaskKind::AuctionEra,
        TaskKind::Account,
        TaskKind::AccountHash,
    ];

    /// Wire name, identical to the serde tag of the matching `Task` variant
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::BlockRaw => "block:raw",
            TaskKind::BlockVerify => "block:verify",
            TaskKind::DeployRaw => "deploy:raw",
            TaskKind::DeployKnown => "deploy:known",
            TaskKind::DeployInfoRaw => "deployinfo:raw",
            TaskKind::TransferRaw => "transfer:raw",
            TaskKind::ContractRaw => "contract:raw",
            TaskKind::ContractPackageRaw => "contractPackage:raw",
            TaskKind::Reward => "reward:raw",
            TaskKind::Auction => "auction:raw",
            TaskKind::AuctionEra => "auctionEra:raw",
            TaskKind::Account => "account:publicKey",
            TaskKind::AccountHash => "account:hash",
        }
    }

    pub fn queue(&self) -> Queue {
        match self {
            TaskKind::BlockRaw | TaskKind::BlockVerify => Queue::Blocks,
            TaskKind::DeployRaw | TaskKind::DeployKnown => Queue::Deploys,
            TaskKind::DeployInfoRaw => Queue::DeployInfos,
            TaskKind::TransferRaw => Queue::Transfers,
            TaskKind::ContractRaw | TaskKind::ContractPackageRaw => Queue::Contracts,
            TaskKind::Reward => Queue::Era,
            TaskKind::Auction => Queue::Auction,
            TaskKind::AuctionEra => Queue::AuctionEra,
            TaskKind::Account | TaskKind::AccountHash => Queue::Accounts,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named queues, one per task family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Blocks,
    Deploys,
    DeployInfos,
    Transfers,
    Contracts,
    Era,
    Auction,
    AuctionEra,
    Accounts,
}

impl Queue {
    pub const ALL: [Queue; 9] = [
        Queue::Blocks,
        Queue::Deploys,
        Queue::DeployInfos,
        Queue::Transfers,
        Queue::Contracts,
        Queue::Era,
        Queue::Auction,
        Queue::AuctionEra,
        Queue::Accounts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Queue::Blocks => "blocks",
            Queue::Deploys => "deploys",
            Queue::DeployInfos => "deployinfos",
            Queue::Transfers => "transfers",
            Queue::Contracts => "contracts",
            Queue::Era => "era",
            Queue::Auction => "auction",
            Queue::AuctionEra => "auctionera",
            Queue::Accounts => "accounts",
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Queue {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Queue::ALL
            .into_iter()
            .find(|q| q.name() == s)
            .ok_or_else(|| {
                let supported: Vec<&str> = Queue::ALL.iter().map(|q| q.name()).collect();
                IndexerError::Config(format!(
                    "Unknown queue {}. Supported queues: {}",
                    s,
                    supported.join(", ")
                ))
            })
    }
}

/// Queues served by a worker and their relative weights
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePriorities {
    entries: Vec<(Queue, u32)>,
}

impl Default for QueuePriorities {
    fn default() -> Self {
        Self {
            entries: Queue::ALL.iter().map(|q| (*q, 1)).collect(),
        }
    }
}

impl QueuePriorities {
    /// Parse a flat `name,priority,name,priority` list
    pub fn parse(items: &[String]) -> Result<Self, IndexerError> {
        const USAGE: &str =
            "Can't parse queues flag. Usage --queues [queue1],[priority1],[queue2],[priority2]";

        if items.is_empty() || items.len() % 2 != 0 {
            return Err(IndexerError::Config(USAGE.to_string()));
        }

        let mut entries: Vec<(Queue, u32)> = Vec::with_capacity(items.len() / 2);
        for pair in items.chunks(2) {
            let queue: Queue = pair[0].trim().parse()?;
            let priority: u32 = pair[1]
                .trim()
                .parse()
                .map_err(|_| IndexerError::Config(USAGE.to_string()))?;
            if priority == 0 {
                return Err(IndexerError::Config(format!(
                    "Priority for queue {} must be positive",
                    queue
                )));
            }
            match entries.iter_mut().find(|(q, _)| *q == queue) {
                Some(entry) => entry.1 = priority,
                None => entries.push((queue, priority)),
            }
        }

        Ok(Self { entries })
    }

    pub fn queues(&self) -> impl Iterator<Item = Queue> + '_ {
        self.entries.iter().map(|(q, _)| *q)
    }

    pub fn priority(&self, queue: Queue) -> Option<u32> {
        self.entries
            .iter()
            .find(|(q, _)| *q == queue)
            .map(|(_, p)| *p)
    }

    /// Order in which to poll the queues this round.
    ///
    /// Weighted sampling without replacement: a queue with priority 6 comes
    /// first six times as often as one with priority 1, but no queue starves.
    pub fn weighted_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Queue> {
        let mut remaining = self.entries.clone();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let total: u64 = remaining.iter().map(|(_, p)| u64::from(*p)).sum();
            let mut pick = rng.gen_range(0..total);
            let mut index = 0;
            for (i, (_, p)) in remaining.iter().enumerate() {
                if pick < u64::from(*p) {
                    index = i;
                    break;
                }
                pick -= u64::from(*p);
            }
            order.push(remaining.remove(index).0);
        }

        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_task_wire_format() {
        let task = Task::DeployInfoRaw {
            deploy_hash: "d1".into(),
            block_hash: "b1".into(),
            state_root_hash: "s1".into(),
            deploy_timestamp: "2021-04-01T00:00:00.000Z".into(),
        };
        let json = task.to_json().unwrap();
        assert!(json.contains(r#""type":"deployinfo:raw""#));
        assert_eq!(Task::from_json(&json).unwrap(), task);

        let auction = Task::from_json(r#"{"type":"auction:raw"}"#).unwrap();
        assert_eq!(auction, Task::Auction);
    }

    #[test]
    fn test_kind_names_match_serde_tags() {
        let samples = vec![
            Task::BlockRaw { block_height: 1 },
            Task::BlockVerify { block_hash: "b".into() },
            Task::DeployRaw { deploy_hash: "d".into() },
            Task::DeployKnown { deploy_hash: "d".into() },
            Task::ContractRaw {
                contract_hash: "c".into(),
                deploy_hash: "d".into(),
                from: "a".into(),
            },
            Task::ContractPackageRaw {
                contract_package_hash: "p".into(),
                deploy_hash: "d".into(),
                from: "a".into(),
            },
            Task::Reward { block_hash: "b".into() },
            Task::Auction,
            Task::AuctionEra { block_height: 7 },
            Task::Account { public_key: "01ab".into() },
            Task::AccountHash { account_hash: "ff".into() },
        ];
        for task in samples {
            let value: serde_json::Value = serde_json::from_str(&task.to_json().unwrap()).unwrap();
            assert_eq!(value["type"], task.kind().name());
        }
    }

    #[test]
    fn test_undecodable_payload() {
        let err = Task::from_json(r#"{"type":"block:raw"}"#).unwrap_err();
        assert!(matches!(err, IndexerError::Payload(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_queue_routing() {
        assert_eq!(TaskKind::BlockVerify.queue(), Queue::Blocks);
        assert_eq!(TaskKind::ContractPackageRaw.queue(), Queue::Contracts);
        assert_eq!(TaskKind::AccountHash.queue(), Queue::Accounts);
        assert_eq!(TaskKind::Reward.queue(), Queue::Era);
        assert_eq!(TaskKind::AuctionEra.queue(), Queue::AuctionEra);
    }

    #[test]
    fn test_parse_priorities() {
        let parsed = QueuePriorities::parse(&strings(&["blocks", "3", "accounts", "1"])).unwrap();
        assert_eq!(parsed.priority(Queue::Blocks), Some(3));
        assert_eq!(parsed.priority(Queue::Accounts), Some(1));
        assert_eq!(parsed.priority(Queue::Deploys), None);
        assert_eq!(parsed.queues().count(), 2);
    }

    #[test]
    fn test_parse_priorities_rejects_bad_input() {
        assert!(QueuePriorities::parse(&strings(&["blocks"])).is_err());
        assert!(QueuePriorities::parse(&strings(&["blockz", "1"])).is_err());
        assert!(QueuePriorities::parse(&strings(&["blocks", "high"])).is_err());
        assert!(QueuePriorities::parse(&strings(&["blocks", "0"])).is_err());
        assert!(QueuePriorities::parse(&[]).is_err());
    }

    #[test]
    fn test_weighted_order_covers_every_queue() {
        let priorities = QueuePriorities::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut order = priorities.weighted_order(&mut rng);
        assert_eq!(order.len(), Queue::ALL.len());
        order.sort_by_key(|q| q.name());
        order.dedup();
        assert_eq!(order.len(), Queue::ALL.len());
    }

    #[test]
    fn test_weighted_order_prefers_heavier_queue() {
        let priorities =
            QueuePriorities::parse(&strings(&["blocks", "9", "contracts", "1"])).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let first_blocks = (0..1000)
            .filter(|_| priorities.weighted_order(&mut rng)[0] == Queue::Blocks)
            .count();
        assert!(first_blocks > 800, "blocks first {} times", first_blocks);
    }
}
