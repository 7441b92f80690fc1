//! Typed views of the node's JSON-RPC results.
//!
//! Only the fields the indexer reads are modeled; the raw bytes of every
//! result are kept alongside for the payload columns.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// `chain_get_block`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResult {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub header: BlockHeader,
    pub body: BlockBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: String,
    pub state_root_hash: String,
    pub timestamp: String,
    pub era_id: u64,
    pub height: u64,
    #[serde(default)]
    pub era_end: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockBody {
    #[serde(default)]
    pub proposer: Option<String>,
    #[serde(default)]
    pub deploy_hashes: Vec<String>,
    #[serde(default)]
    pub transfer_hashes: Vec<String>,
}

/// `info_get_deploy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResult {
    pub deploy: Deploy,
    #[serde(default)]
    pub execution_results: Vec<ExecutionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deploy {
    pub hash: String,
    pub header: DeployHeader,
    pub session: ExecutableItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployHeader {
    pub account: String,
    pub timestamp: String,
}

/// A named argument as `[name, {cl_type, bytes, parsed}]`
pub type NamedArg = (String, CLValue);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CLValue {
    #[serde(default)]
    pub cl_type: JsonValue,
    #[serde(default)]
    pub bytes: String,
    #[serde(default)]
    pub parsed: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutableItem {
    ModuleBytes {
        #[serde(default)]
        module_bytes: String,
        #[serde(default)]
        args: Vec<NamedArg>,
    },
    StoredContractByHash {
        hash: String,
        entry_point: String,
        #[serde(default)]
        args: Vec<NamedArg>,
    },
    StoredContractByName {
        name: String,
        entry_point: String,
        #[serde(default)]
        args: Vec<NamedArg>,
    },
    StoredVersionedContractByHash {
        hash: String,
        #[serde(default)]
        version: Option<u32>,
        entry_point: String,
        #[serde(default)]
        args: Vec<NamedArg>,
    },
    StoredVersionedContractByName {
        name: String,
        #[serde(default)]
        version: Option<u32>,
        entry_point: String,
        #[serde(default)]
        args: Vec<NamedArg>,
    },
    Transfer {
        #[serde(default)]
        args: Vec<NamedArg>,
    },
}

impl ExecutableItem {
    pub fn args(&self) -> &[NamedArg] {
        match self {
            ExecutableItem::ModuleBytes { args, .. }
            | ExecutableItem::StoredContractByHash { args, .. }
            | ExecutableItem::StoredContractByName { args, .. }
            | ExecutableItem::StoredVersionedContractByHash { args, .. }
            | ExecutableItem::StoredVersionedContractByName { args, .. }
            | ExecutableItem::Transfer { args } => args,
        }
    }

    pub fn entry_point(&self) -> Option<&str> {
        match self {
            ExecutableItem::StoredContractByHash { entry_point, .. }
            | ExecutableItem::StoredContractByName { entry_point, .. }
            | ExecutableItem::StoredVersionedContractByHash { entry_point, .. }
            | ExecutableItem::StoredVersionedContractByName { entry_point, .. } => {
                Some(entry_point.as_str())
            }
            ExecutableItem::ModuleBytes { .. } | ExecutableItem::Transfer { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub block_hash: String,
    pub result: ExecutionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success {
        effect: ExecutionEffect,
        #[serde(default)]
        transfers: Vec<String>,
        cost: String,
    },
    Failure {
        effect: ExecutionEffect,
        #[serde(default)]
        transfers: Vec<String>,
        cost: String,
        error_message: String,
    },
}

impl ExecutionOutcome {
    pub fn effect(&self) -> &ExecutionEffect {
        match self {
            ExecutionOutcome::Success { effect, .. } | ExecutionOutcome::Failure { effect, .. } => {
                effect
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionEffect {
    #[serde(default)]
    pub transforms: Vec<TransformEntry>,
}

/// `transform` is either a bare tag (`"WriteContract"`) or a single-key
/// object (`{"WriteCLValue": {...}}`), so it stays loosely typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformEntry {
    pub key: String,
    pub transform: JsonValue,
}

/// `query_global_state` for a `deploy-` key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInfoResult {
    pub stored_value: DeployInfoStoredValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInfoStoredValue {
    #[serde(rename = "DeployInfo")]
    pub deploy_info: DeployInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployInfo {
    pub deploy_hash: String,
    #[serde(default)]
    pub transfers: Vec<String>,
    pub from: String,
    pub source: String,
    pub gas: String,
}

/// `query_global_state` for a `transfer-` key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub stored_value: TransferStoredValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStoredValue {
    #[serde(rename = "Transfer")]
    pub transfer: Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub deploy_hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub source: String,
    pub target: String,
    pub amount: String,
    pub gas: String,
    #[serde(default)]
    pub id: Option<u64>,
}

/// `state_get_auction_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionResult {
    pub auction_state: AuctionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionState {
    pub state_root_hash: String,
    pub block_height: u64,
    #[serde(default)]
    pub bids: Vec<BidEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidEntry {
    pub public_key: String,
    pub bid: Bid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub bonding_purse: String,
    pub staked_amount: String,
    pub delegation_rate: u8,
    #[serde(default)]
    pub delegators: Vec<Delegator>,
    #[serde(default)]
    pub inactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegator {
    pub public_key: String,
    pub staked_amount: String,
    pub bonding_purse: String,
    pub delegatee: String,
}

/// `chain_get_era_info_by_switch_block`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraInfoResult {
    #[serde(default)]
    pub era_summary: Option<EraSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraSummary {
    pub block_hash: String,
    pub era_id: u64,
    pub stored_value: EraInfoStoredValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraInfoStoredValue {
    #[serde(rename = "EraInfo")]
    pub era_info: EraInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraInfo {
    #[serde(default)]
    pub seigniorage_allocations: Vec<SeigniorageAllocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SeigniorageAllocation {
    Validator {
        validator_public_key: String,
        amount: String,
    },
    Delegator {
        delegator_public_key: String,
        validator_public_key: String,
        amount: String,
    },
}

/// `query_global_state` for a contract, package or account key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredValueResult {
    pub stored_value: JsonValue,
}

/// `state_get_account_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResult {
    pub account: Account,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_hash: String,
    pub main_purse: String,
}
