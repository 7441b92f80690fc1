//! JSON builders shaped like node RPC results, shared by unit tests.

use serde_json::{json, Value as JsonValue};

pub fn block_json(
    height: u64,
    hash: &str,
    deploys: &[&str],
    transfers: &[&str],
    era_end: bool,
) -> JsonValue {
    let era_end = if era_end {
        json!({ "era_report": { "equivocators": [], "rewards": [], "inactive_validators": [] } })
    } else {
        JsonValue::Null
    };
    json!({
        "api_version": "1.4.5",
        "block": {
            "hash": hash,
            "header": {
                "parent_hash": format!("parent-of-{}", hash),
                "state_root_hash": format!("root-{}", height),
                "timestamp": "2021-04-01T12:00:00.000Z",
                "era_id": 12,
                "height": height,
                "era_end": era_end
            },
            "body": {
                "proposer": "01aa",
                "deploy_hashes": deploys,
                "transfer_hashes": transfers
            }
        }
    })
}

pub fn transfer_session() -> JsonValue {
    json!({
        "Transfer": {
            "args": [
                ["amount", { "cl_type": "U512", "bytes": "0400f90295", "parsed": "2500000000" }],
                ["target", { "cl_type": { "ByteArray": 32 }, "bytes": "bb", "parsed": "bb" }],
                ["id", { "cl_type": { "Option": "U64" }, "bytes": "01", "parsed": 7 }]
            ]
        }
    })
}

pub fn deploy_json(
    hash: &str,
    account: &str,
    session: JsonValue,
    transforms: JsonValue,
    error_message: Option<&str>,
) -> JsonValue {
    let result = match error_message {
        None => json!({
            "Success": {
                "effect": { "operations": [], "transforms": transforms },
                "transfers": [],
                "cost": "100000000"
            }
        }),
        Some(message) => json!({
            "Failure": {
                "effect": { "operations": [], "transforms": transforms },
                "transfers": [],
                "cost": "100000000",
                "error_message": message
            }
        }),
    };
    json!({
        "api_version": "1.4.5",
        "deploy": {
            "hash": hash,
            "header": {
                "account": account,
                "timestamp": "2021-04-01T11:59:30.000Z",
                "ttl": "30m",
                "gas_price": 1,
                "chain_name": "casper"
            },
            "payment": { "ModuleBytes": { "module_bytes": "", "args": [] } },
            "session": session,
            "approvals": []
        },
        "execution_results": [
            { "block_hash": "b100", "result": result }
        ]
    })
}

pub fn deploy_info_json(deploy_hash: &str, gas: &str, transfers: &[&str]) -> JsonValue {
    json!({
        "api_version": "1.4.5",
        "stored_value": {
            "DeployInfo": {
                "deploy_hash": deploy_hash,
                "transfers": transfers,
                "from": "account-hash-aa",
                "source": "uref-aa-007",
                "gas": gas
            }
        }
    })
}

pub fn transfer_json(deploy_hash: &str, to: Option<&str>, amount: &str) -> JsonValue {
    json!({
        "api_version": "1.4.5",
        "stored_value": {
            "Transfer": {
                "deploy_hash": deploy_hash,
                "from": "account-hash-aa",
                "to": to,
                "source": "uref-aa-007",
                "target": "uref-bb-004",
                "amount": amount,
                "gas": "0",
                "id": 7
            }
        }
    })
}

pub fn auction_json(block_height: u64, bids: JsonValue) -> JsonValue {
    json!({
        "api_version": "1.4.5",
        "auction_state": {
            "state_root_hash": format!("root-{}", block_height),
            "block_height": block_height,
            "era_validators": [],
            "bids": bids
        }
    })
}

pub fn bid_json(public_key: &str, staked_amount: &str, delegators: JsonValue) -> JsonValue {
    json!({
        "public_key": public_key,
        "bid": {
            "bonding_purse": format!("uref-{}", public_key),
            "staked_amount": staked_amount,
            "delegation_rate": 10,
            "delegators": delegators,
            "inactive": false
        }
    })
}

pub fn delegator_json(public_key: &str, delegatee: &str, staked_amount: &str) -> JsonValue {
    json!({
        "public_key": public_key,
        "staked_amount": staked_amount,
        "bonding_purse": format!("uref-{}", public_key),
        "delegatee": delegatee
    })
}

pub fn era_info_json(block_hash: &str, era_id: u64, allocations: JsonValue) -> JsonValue {
    json!({
        "api_version": "1.4.5",
        "era_summary": {
            "block_hash": block_hash,
            "era_id": era_id,
            "state_root_hash": "root",
            "merkle_proof": "",
            "stored_value": {
                "EraInfo": { "seigniorage_allocations": allocations }
            }
        }
    })
}
