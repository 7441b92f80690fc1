//! Normalization of RPC results into storable rows.
//!
//! Everything here is pure: no RPC, no store, no queue.

pub mod auction;
pub mod block;
pub mod deploy;
pub mod deploy_info;
pub mod reward;
pub mod transfer;

use crate::chain::keys;
use crate::IndexerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Parse RFC3339 timestamp string into DateTime<Utc>
/// Handles timestamps with or without timezone suffixes
pub fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, IndexerError> {
    let normalized = if timestamp.ends_with('Z')
        || timestamp.contains('+')
        || timestamp.rfind('-').map_or(false, |i| i > 10)
    {
        timestamp.to_string()
    } else {
        format!("{}Z", timestamp)
    };

    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IndexerError::Parse(format!("Invalid timestamp '{}': {}", timestamp, e)))
}

/// Remove NUL escapes and raw NUL characters, which PostgreSQL text and
/// downstream JSON consumers reject
pub fn sanitize(text: &str) -> String {
    text.replace("\\u0000", "").replace('\0', "")
}

/// Raw payload bytes as sanitized text
pub fn raw_text(bytes: &[u8]) -> String {
    sanitize(&String::from_utf8_lossy(bytes))
}

/// Parse a base-10 amount (motes, gas, cost).
///
/// Only plain digit strings are accepted. A value too large for the stored
/// numeric type is an error, never truncated.
pub fn parse_amount(field: &str, value: &str) -> Result<Decimal, IndexerError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IndexerError::Parse(format!(
            "{} is not a base-10 integer: '{}'",
            field, value
        )));
    }

    Decimal::from_str_exact(value)
        .map_err(|e| IndexerError::Parse(format!("{} out of range '{}': {}", field, value, e)))
}

/// Heights and era ids arrive as u64 but are stored as BIGINT
pub fn to_bigint(field: &str, value: u64) -> Result<i64, IndexerError> {
    i64::try_from(value)
        .map_err(|_| IndexerError::Parse(format!("{} out of range: {}", field, value)))
}

pub fn strip_hash_prefix(key: &str) -> String {
    key.strip_prefix(keys::HASH).unwrap_or(key).to_string()
}

pub fn strip_account_hash_prefix(key: &str) -> String {
    key.strip_prefix(keys::ACCOUNT_HASH).unwrap_or(key).to_string()
}
