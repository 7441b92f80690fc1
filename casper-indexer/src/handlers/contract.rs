use super::HandlerContext;
use crate::chain::keys::{self, with_prefix};
use crate::models::{ContractPackageRow, ContractRow};
use crate::parsing::{raw_text, strip_hash_prefix};
use crate::IndexerError;
use serde_json::Value as JsonValue;

const PACKAGE_PREFIX: &str = "contract-package-wasm";

pub async fn handle_contract_raw(
    ctx: &HandlerContext,
    contract_hash: &str,
    deploy_hash: &str,
    from: &str,
) -> Result<(), IndexerError> {
    let key = with_prefix(keys::HASH, contract_hash);
    let (result, raw) = ctx.rpc.get_stored_value(&key).await?;
    let contract = stored(&result.stored_value, "Contract", &key)?;

    let package_hash = contract
        .get("contract_package_hash")
        .and_then(JsonValue::as_str)
        .map(|h| strip_hash_prefix(h.strip_prefix(PACKAGE_PREFIX).unwrap_or(h)));

    ctx.store
        .insert_contract(&ContractRow {
            hash: contract_hash.to_string(),
            contract_package_hash: package_hash,
            deploy_hash: deploy_hash.to_string(),
            from: from.to_string(),
            raw: raw_text(&raw),
        })
        .await
}

pub async fn handle_contract_package_raw(
    ctx: &HandlerContext,
    contract_package_hash: &str,
    deploy_hash: &str,
    from: &str,
) -> Result<(), IndexerError> {
    let key = with_prefix(keys::HASH, contract_package_hash);
    let (result, raw) = ctx.rpc.get_stored_value(&key).await?;
    stored(&result.stored_value, "ContractPackage", &key)?;

    ctx.store
        .insert_contract_package(&ContractPackageRow {
            hash: contract_package_hash.to_string(),
            deploy_hash: deploy_hash.to_string(),
            from: from.to_string(),
            raw: raw_text(&raw),
        })
        .await
}

fn stored<'a>(value: &'a JsonValue, tag: &str, key: &str) -> Result<&'a JsonValue, IndexerError> {
    value
        .get(tag)
        .ok_or_else(|| IndexerError::Parse(format!("{} does not hold a {}", key, tag)))
}
