//! Per-task procedures: fetch, parse, persist, fan out.
//!
//! A handler returns the first error it hits and does nothing after it. The
//! one exception is the deploy-info placeholder row.

pub mod account;
pub mod auction;
pub mod block;
pub mod contract;
pub mod deploy;
pub mod deploy_info;
pub mod reward;
pub mod transfer;

use crate::chain::ChainRpc;
use crate::queue::TaskQueue;
use crate::store::IndexStore;
use crate::tasks::Task;
use crate::IndexerError;
use std::sync::Arc;

/// Collaborators every handler works against
#[derive(Clone)]
pub struct HandlerContext {
    pub rpc: Arc<dyn ChainRpc>,
    pub store: Arc<dyn IndexStore>,
    pub queue: Arc<dyn TaskQueue>,
}

impl HandlerContext {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn IndexStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self { rpc, store, queue }
    }

    pub async fn handle(&self, task: &Task) -> Result<(), IndexerError> {
        match task {
            Task::BlockRaw { block_height } => block::handle_block_raw(self, *block_height).await,
            Task::BlockVerify { block_hash } => block::handle_block_verify(self, block_hash).await,
            Task::DeployRaw { deploy_hash } => deploy::handle_deploy_raw(self, deploy_hash).await,
            Task::DeployKnown { deploy_hash } => {
                deploy::handle_deploy_known(self, deploy_hash).await
            }
            Task::DeployInfoRaw {
                deploy_hash,
                block_hash,
                state_root_hash,
                deploy_timestamp,
            } => {
                deploy_info::handle_deploy_info_raw(
                    self,
                    deploy_hash,
                    block_hash,
                    state_root_hash,
                    deploy_timestamp,
                )
                .await
            }
            Task::TransferRaw {
                transfer_hash,
                block_hash,
                deploy_hash,
                state_root_hash,
                deploy_timestamp,
            } => {
                let ctx = crate::parsing::transfer::TransferContext {
                    transfer_hash,
                    block_hash,
                    deploy_hash,
                    state_root_hash,
                    deploy_timestamp,
                };
                transfer::handle_transfer_raw(self, ctx).await
            }
            Task::ContractRaw {
                contract_hash,
                deploy_hash,
                from,
            } => contract::handle_contract_raw(self, contract_hash, deploy_hash, from).await,
            Task::ContractPackageRaw {
                contract_package_hash,
                deploy_hash,
                from,
            } => {
                contract::handle_contract_package_raw(
                    self,
                    contract_package_hash,
                    deploy_hash,
                    from,
                )
                .await
            }
            Task::Reward { block_hash } => reward::handle_reward(self, block_hash).await,
            Task::Auction => auction::handle_auction(self).await,
            Task::AuctionEra { block_height } => {
                auction::handle_auction_era(self, *block_height).await
            }
            Task::Account { public_key } => account::handle_account(self, public_key).await,
            Task::AccountHash { account_hash } => {
                account::handle_account_hash(self, account_hash).await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::HandlerContext;
    use crate::chain::StaticRpc;
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    pub struct Harness {
        pub rpc: Arc<StaticRpc>,
        pub store: Arc<MemoryStore>,
        pub queue: Arc<MemoryQueue>,
        pub ctx: HandlerContext,
    }

    pub fn harness(rpc: StaticRpc) -> Harness {
        let rpc = Arc::new(rpc);
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let ctx = HandlerContext::new(rpc.clone(), store.clone(), queue.clone());
        Harness {
            rpc,
            store,
            queue,
            ctx,
        }
    }
}
