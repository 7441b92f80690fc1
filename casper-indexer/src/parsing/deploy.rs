//! Deploy normalization: execution outcome, kind tags, metadata, events and
//! the contracts a deploy wrote.

use super::{parse_amount, parse_timestamp, raw_text, sanitize, strip_hash_prefix};
use crate::chain::{DeployResult, ExecutableItem, ExecutionOutcome, NamedArg, TransformEntry};
use crate::models::DeployRow;
use crate::value::{display_tree, display_value};
use crate::IndexerError;
use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};

pub const AUCTION_ENTRY_POINTS: [&str; 6] = [
    "delegate",
    "undelegate",
    "redelegate",
    "add_bid",
    "withdraw_bid",
    "activate_bid",
];

pub const TOKEN_ENTRY_POINTS: [&str; 5] = ["transfer", "transfer_from", "approve", "mint", "burn"];

const ADD_BID_ARGS: [&str; 3] = ["public_key", "delegation_rate", "amount"];
const REDELEGATE_ARGS: [&str; 4] = ["delegator", "validator", "amount", "new_validator"];

const WRITE_CONTRACT: &str = "WriteContract";
const WRITE_CONTRACT_PACKAGE: &str = "WriteContractPackage";
const WRITE_CL_VALUE: &str = "WriteCLValue";
const EVENT_TYPE: &str = "event_type";
pub const EVENT_KEY_FIELD: &str = "transform_key";

/// A normalized deploy plus the secondary facts its handlers fan out on
#[derive(Debug, Clone)]
pub struct ParsedDeploy {
    pub row: DeployRow,
    pub contracts: Vec<String>,
    pub contract_packages: Vec<String>,
}

/// Outcome of the first execution result
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub success: bool,
    pub cost: Decimal,
    pub error_message: Option<String>,
    pub block_hash: String,
}

pub fn parse_deploy(result: &DeployResult, raw: &[u8]) -> Result<ParsedDeploy, IndexerError> {
    let execution = execution(result)?;
    let deploy = &result.deploy;
    let session = &deploy.session;
    let (metadata_type, metadata) = metadata(session);

    let row = DeployRow {
        hash: deploy.hash.clone(),
        account: deploy.header.account.clone(),
        cost: execution.cost,
        result: execution.success,
        error_message: execution.error_message,
        timestamp: parse_timestamp(&deploy.header.timestamp)?,
        block_hash: execution.block_hash,
        kind: kind_tag(session).to_string(),
        raw: raw_text(raw),
        metadata_type,
        contract_hash: stored_contract_hash(session),
        contract_name: stored_contract_name(session),
        entry_point: session.entry_point().map(str::to_string),
        metadata,
        events: events(result),
    };

    Ok(ParsedDeploy {
        row,
        contracts: written_keys(result, WRITE_CONTRACT),
        contract_packages: written_keys(result, WRITE_CONTRACT_PACKAGE),
    })
}

/// Re-read a stored raw payload
pub fn parse_stored_deploy(raw: &str) -> Result<DeployResult, IndexerError> {
    serde_json::from_str(raw)
        .map_err(|e| IndexerError::Parse(format!("stored deploy payload: {}", e)))
}

/// A deploy without execution results has not been executed yet; the node
/// will have it later, so this is a fetch failure.
pub fn execution(result: &DeployResult) -> Result<Execution, IndexerError> {
    let first = result.execution_results.first().ok_or_else(|| {
        IndexerError::Fetch(format!(
            "deploy {} has no execution result yet",
            result.deploy.hash
        ))
    })?;

    match &first.result {
        ExecutionOutcome::Success { cost, .. } => Ok(Execution {
            success: true,
            cost: parse_amount("cost", cost)?,
            error_message: None,
            block_hash: first.block_hash.clone(),
        }),
        ExecutionOutcome::Failure {
            cost,
            error_message,
            ..
        } => Ok(Execution {
            success: false,
            cost: parse_amount("cost", cost)?,
            error_message: Some(sanitize(error_message)),
            block_hash: first.block_hash.clone(),
        }),
    }
}

pub fn kind_tag(session: &ExecutableItem) -> &'static str {
    match session {
        ExecutableItem::ModuleBytes { .. } => "module_bytes",
        ExecutableItem::StoredContractByHash { .. } => "stored_contract_by_hash",
        ExecutableItem::StoredContractByName { .. } => "stored_contract_by_name",
        ExecutableItem::StoredVersionedContractByHash { .. } => {
            "stored_versioned_contract_by_hash"
        }
        ExecutableItem::StoredVersionedContractByName { .. } => {
            "stored_versioned_contract_by_name"
        }
        ExecutableItem::Transfer { .. } => "transfer",
    }
}

fn stored_contract_hash(session: &ExecutableItem) -> Option<String> {
    match session {
        ExecutableItem::StoredContractByHash { hash, .. }
        | ExecutableItem::StoredVersionedContractByHash { hash, .. } => {
            Some(strip_hash_prefix(hash))
        }
        _ => None,
    }
}

fn stored_contract_name(session: &ExecutableItem) -> Option<String> {
    match session {
        ExecutableItem::StoredContractByName { name, .. }
        | ExecutableItem::StoredVersionedContractByName { name, .. } => Some(name.clone()),
        _ => None,
    }
}

/// Metadata kind and content. An empty kind means no rule matched.
pub fn metadata(session: &ExecutableItem) -> (String, JsonValue) {
    let kind = match session {
        ExecutableItem::Transfer { .. } => Some("transfer".to_string()),
        ExecutableItem::ModuleBytes { args, .. } => {
            if has_args(args, &ADD_BID_ARGS) {
                Some("add_bid".to_string())
            } else if has_args(args, &REDELEGATE_ARGS) {
                Some("redelegate".to_string())
            } else {
                None
            }
        }
        stored => stored.entry_point().and_then(|ep| {
            if AUCTION_ENTRY_POINTS.contains(&ep) {
                Some(ep.to_string())
            } else if TOKEN_ENTRY_POINTS.contains(&ep) {
                Some(format!("token_{}", ep))
            } else {
                None
            }
        }),
    };

    match kind {
        Some(kind) => (kind, args_content(session.args())),
        None => (String::new(), JsonValue::Object(Map::new())),
    }
}

fn has_args(args: &[NamedArg], names: &[&str]) -> bool {
    names
        .iter()
        .all(|name| args.iter().any(|(arg, _)| arg == name))
}

fn args_content(args: &[NamedArg]) -> JsonValue {
    let mut content = Map::with_capacity(args.len());
    for (name, value) in args {
        content.insert(
            sanitize(name),
            JsonValue::String(sanitize(&display_value(&value.parsed))),
        );
    }
    JsonValue::Object(content)
}

/// Events emitted through `WriteCLValue` transforms, as a JSON array
pub fn events(result: &DeployResult) -> JsonValue {
    let mut events = Vec::new();
    for entry in transforms(result) {
        let Some(parsed) = entry
            .transform
            .get(WRITE_CL_VALUE)
            .and_then(|v| v.get("parsed"))
        else {
            continue;
        };
        if let Some(mut event) = event_fields(parsed) {
            event.insert(
                EVENT_KEY_FIELD.to_string(),
                JsonValue::String(sanitize(&entry.key)),
            );
            events.push(JsonValue::Object(event));
        }
    }
    JsonValue::Array(events)
}

/// Event entries from either an object or a `[{key, value}]` list
fn event_fields(parsed: &JsonValue) -> Option<Map<String, JsonValue>> {
    let mut fields = Map::new();
    match parsed {
        JsonValue::Object(map) if map.contains_key(EVENT_TYPE) => {
            for (k, v) in map {
                fields.insert(sanitize(k), sanitized_display(v));
            }
        }
        JsonValue::Array(pairs) => {
            let is_event = pairs
                .iter()
                .any(|p| p.get("key").and_then(JsonValue::as_str) == Some(EVENT_TYPE));
            if !is_event {
                return None;
            }
            for pair in pairs {
                let Some(key) = pair.get("key").map(display_value) else {
                    continue;
                };
                let value = pair.get("value").unwrap_or(&JsonValue::Null);
                fields.insert(sanitize(&key), sanitized_display(value));
            }
        }
        _ => return None,
    }
    Some(fields)
}

fn sanitized_display(value: &JsonValue) -> JsonValue {
    match display_tree(value) {
        JsonValue::String(s) => JsonValue::String(sanitize(&s)),
        tree => JsonValue::String(sanitize(&tree.to_string())),
    }
}

/// Keys written with the given transform tag, `hash-` stripped
pub fn written_keys(result: &DeployResult, tag: &str) -> Vec<String> {
    transforms(result)
        .filter(|entry| transform_tag(&entry.transform) == Some(tag))
        .map(|entry| strip_hash_prefix(&entry.key))
        .collect()
}

fn transforms(result: &DeployResult) -> impl Iterator<Item = &TransformEntry> {
    result
        .execution_results
        .first()
        .into_iter()
        .flat_map(|r| r.result.effect().transforms.iter())
}

/// `"WriteContract"` or `{"WriteCLValue": {...}}`
fn transform_tag(transform: &JsonValue) -> Option<&str> {
    match transform {
        JsonValue::String(tag) => Some(tag.as_str()),
        JsonValue::Object(map) if map.len() == 1 => map.keys().next().map(String::as_str),
        _ => None,
    }
}
