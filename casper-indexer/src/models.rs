//! Storable rows, one struct per table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    pub hash: String,
    pub parent_hash: String,
    pub state_root_hash: String,
    pub era_id: i64,
    pub height: i64,
    pub timestamp: DateTime<Utc>,
    pub era_end: bool,
    pub proposer: Option<String>,
    pub deploy_count: i32,
    pub transfer_count: i32,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployRow {
    pub hash: String,
    pub account: String,
    pub cost: Decimal,
    pub result: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub block_hash: String,
    pub kind: String,
    pub raw: String,
    pub metadata_type: String,
    pub contract_hash: Option<String>,
    pub contract_name: Option<String>,
    pub entry_point: Option<String>,
    pub metadata: JsonValue,
    pub events: JsonValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployInfoRow {
    pub deploy_hash: String,
    pub block_hash: String,
    pub from: String,
    pub source: String,
    pub gas: Decimal,
    pub transfers: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferRow {
    pub transfer_hash: String,
    pub block_hash: String,
    pub deploy_hash: String,
    pub state_root_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub source: String,
    pub target: String,
    pub amount: Decimal,
    pub gas: Decimal,
    pub transfer_id: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BidRow {
    pub public_key: String,
    pub bonding_purse: String,
    pub staked_amount: Decimal,
    pub delegation_rate: i16,
    pub inactive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelegatorRow {
    pub public_key: String,
    pub delegatee: String,
    pub staked_amount: Decimal,
    pub bonding_purse: String,
}

/// One parsed auction snapshot. Built completely before anything is stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuctionBatch {
    pub bids: Vec<BidRow>,
    pub delegators: Vec<DelegatorRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardRow {
    pub era_id: i64,
    pub block_hash: String,
    pub recipient: String,
    pub validator: String,
    pub is_delegator: bool,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractRow {
    pub hash: String,
    pub contract_package_hash: Option<String>,
    pub deploy_hash: String,
    pub from: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractPackageRow {
    pub hash: String,
    pub deploy_hash: String,
    pub from: String,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub account_hash: String,
    pub public_key: Option<String>,
    pub main_purse: Option<String>,
    pub raw: String,
}
