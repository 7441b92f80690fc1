use super::{parse_amount, parse_timestamp, raw_text};
use crate::chain::DeployInfoResult;
use crate::models::DeployInfoRow;
use crate::IndexerError;
use rust_decimal::Decimal;

/// Payload stored when the deploy info could not be fetched
pub const ERROR_PAYLOAD: &str = "\"ERROR\"";

pub fn parse_deploy_info(
    result: &DeployInfoResult,
    raw: &[u8],
    block_hash: &str,
    deploy_timestamp: &str,
) -> Result<DeployInfoRow, IndexerError> {
    let info = &result.stored_value.deploy_info;

    Ok(DeployInfoRow {
        deploy_hash: info.deploy_hash.clone(),
        block_hash: block_hash.to_string(),
        from: info.from.clone(),
        source: info.source.clone(),
        gas: parse_amount("gas", &info.gas)?,
        transfers: info.transfers.join(", "),
        timestamp: Some(parse_timestamp(deploy_timestamp)?),
        raw: raw_text(raw),
    })
}

/// Placeholder row so a deploy info is never silently missing
pub fn error_row(deploy_hash: &str, block_hash: &str) -> DeployInfoRow {
    DeployInfoRow {
        deploy_hash: deploy_hash.to_string(),
        block_hash: block_hash.to_string(),
        from: String::new(),
        source: String::new(),
        gas: Decimal::ZERO,
        transfers: String::new(),
        timestamp: None,
        raw: ERROR_PAYLOAD.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::deploy_info_json;

    fn parse(gas: &str, transfers: &[&str]) -> Result<DeployInfoRow, IndexerError> {
        let json = deploy_info_json("d1", gas, transfers);
        let raw = serde_json::to_vec(&json).unwrap();
        let result: DeployInfoResult = serde_json::from_value(json).unwrap();
        parse_deploy_info(&result, &raw, "b100", "2021-04-01T12:00:00.000Z")
    }

    #[test]
    fn test_parse_deploy_info() {
        let row = parse("1000", &["transfer-t1", "transfer-t2"]).unwrap();
        assert_eq!(row.deploy_hash, "d1");
        assert_eq!(row.block_hash, "b100");
        assert_eq!(row.from, "account-hash-aa");
        assert_eq!(row.gas, Decimal::from(1000));
        assert_eq!(row.transfers, "transfer-t1, transfer-t2");
        assert!(row.timestamp.is_some());
    }

    #[test]
    fn test_non_numeric_gas_fails() {
        assert!(matches!(parse("lots", &[]), Err(IndexerError::Parse(_))));
    }

    #[test]
    fn test_error_row() {
        let row = error_row("d1", "b100");
        assert_eq!(row.from, "");
        assert_eq!(row.source, "");
        assert_eq!(row.gas, Decimal::ZERO);
        assert_eq!(row.raw, "\"ERROR\"");
    }
}
