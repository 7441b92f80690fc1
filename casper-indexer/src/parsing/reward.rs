use super::{parse_amount, to_bigint};
use crate::chain::{EraInfoResult, SeigniorageAllocation};
use crate::models::RewardRow;
use crate::IndexerError;

/// Seigniorage allocations of one era. A validator's own reward has the
/// validator as both recipient and validator.
pub fn parse_rewards(
    result: &EraInfoResult,
    block_hash: &str,
) -> Result<Vec<RewardRow>, IndexerError> {
    let summary = result.era_summary.as_ref().ok_or_else(|| {
        IndexerError::Fetch(format!("no era summary for switch block {}", block_hash))
    })?;
    let era_id = to_bigint("era_id", summary.era_id)?;

    summary
        .stored_value
        .era_info
        .seigniorage_allocations
        .iter()
        .map(|allocation| {
            let (recipient, validator, amount, is_delegator) = match allocation {
                SeigniorageAllocation::Validator {
                    validator_public_key,
                    amount,
                } => (validator_public_key, validator_public_key, amount, false),
                SeigniorageAllocation::Delegator {
                    delegator_public_key,
                    validator_public_key,
                    amount,
                } => (delegator_public_key, validator_public_key, amount, true),
            };
            let amount = parse_amount("amount", amount).map_err(|e| {
                IndexerError::Parse(format!("reward of {} in era {}: {}", recipient, era_id, e))
            })?;

            Ok(RewardRow {
                era_id,
                block_hash: summary.block_hash.clone(),
                recipient: recipient.clone(),
                validator: validator.clone(),
                is_delegator,
                amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::era_info_json;
    use rust_decimal::Decimal;
    use serde_json::json;

    #[test]
    fn test_parse_rewards() {
        let json = era_info_json(
            "b200",
            13,
            json!([
                { "Validator": { "validator_public_key": "01v1", "amount": "500" } },
                { "Delegator": {
                    "delegator_public_key": "01d1",
                    "validator_public_key": "01v1",
                    "amount": "50"
                } }
            ]),
        );
        let result: EraInfoResult = serde_json::from_value(json).unwrap();
        let rows = parse_rewards(&result, "b200").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recipient, "01v1");
        assert!(!rows[0].is_delegator);
        assert_eq!(rows[1].recipient, "01d1");
        assert_eq!(rows[1].validator, "01v1");
        assert_eq!(rows[1].amount, Decimal::from(50));
        assert_eq!(rows[1].era_id, 13);
    }

    #[test]
    fn test_missing_summary_is_fetch_error() {
        let result = EraInfoResult { era_summary: None };
        assert!(matches!(
            parse_rewards(&result, "b1"),
            Err(IndexerError::Fetch(_))
        ));
    }

    #[test]
    fn test_bad_amount_rejects_batch() {
        let json = era_info_json(
            "b200",
            13,
            json!([{ "Validator": { "validator_public_key": "01v1", "amount": "x" } }]),
        );
        let result: EraInfoResult = serde_json::from_value(json).unwrap();
        assert!(matches!(
            parse_rewards(&result, "b200"),
            Err(IndexerError::Parse(_))
        ));
    }
}
