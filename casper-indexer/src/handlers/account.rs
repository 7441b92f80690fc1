use super::HandlerContext;
use crate::chain::keys::{self, with_prefix};
use crate::models::AccountRow;
use crate::parsing::{raw_text, strip_account_hash_prefix};
use crate::IndexerError;
use serde_json::Value as JsonValue;

pub async fn handle_account(ctx: &HandlerContext, public_key: &str) -> Result<(), IndexerError> {
    let (result, raw) = ctx.rpc.get_account(public_key).await?;

    ctx.store
        .upsert_account(&AccountRow {
            account_hash: strip_account_hash_prefix(&result.account.account_hash),
            public_key: Some(public_key.to_string()),
            main_purse: Some(result.account.main_purse.clone()),
            raw: raw_text(&raw),
        })
        .await
}

/// Accounts only known by hash; the public key is left as stored
pub async fn handle_account_hash(
    ctx: &HandlerContext,
    account_hash: &str,
) -> Result<(), IndexerError> {
    let key = with_prefix(keys::ACCOUNT_HASH, account_hash);
    let (result, raw) = ctx.rpc.get_stored_value(&key).await?;
    let account = result
        .stored_value
        .get("Account")
        .ok_or_else(|| IndexerError::Parse(format!("{} does not hold an Account", key)))?;

    ctx.store
        .upsert_account(&AccountRow {
            account_hash: strip_account_hash_prefix(account_hash),
            public_key: None,
            main_purse: account
                .get("main_purse")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            raw: raw_text(&raw),
        })
        .await
}
