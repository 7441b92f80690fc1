use super::{parse_amount, parse_timestamp, raw_text, strip_account_hash_prefix};
use crate::chain::TransferResult;
use crate::models::TransferRow;
use crate::IndexerError;
use rust_decimal::Decimal;

/// Identifiers the transfer task carries
#[derive(Debug, Clone, Copy)]
pub struct TransferContext<'a> {
    pub transfer_hash: &'a str,
    pub block_hash: &'a str,
    pub deploy_hash: &'a str,
    pub state_root_hash: &'a str,
    pub deploy_timestamp: &'a str,
}

pub fn parse_transfer(
    result: &TransferResult,
    raw: &[u8],
    ctx: TransferContext<'_>,
) -> Result<TransferRow, IndexerError> {
    let transfer = &result.stored_value.transfer;

    Ok(TransferRow {
        transfer_hash: ctx.transfer_hash.to_string(),
        block_hash: ctx.block_hash.to_string(),
        deploy_hash: ctx.deploy_hash.to_string(),
        state_root_hash: ctx.state_root_hash.to_string(),
        from: transfer.from.clone(),
        to: transfer.to.clone(),
        source: transfer.source.clone(),
        target: transfer.target.clone(),
        amount: parse_amount("amount", &transfer.amount)?,
        gas: parse_amount("gas", &transfer.gas)?,
        transfer_id: transfer.id.map(Decimal::from),
        timestamp: parse_timestamp(ctx.deploy_timestamp)?,
        raw: raw_text(raw),
    })
}

/// Sender and receiver account hashes, prefix stripped. A transfer to a
/// purse has no receiver account.
pub fn account_hashes(result: &TransferResult) -> (String, Option<String>) {
    let transfer = &result.stored_value.transfer;
    (
        strip_account_hash_prefix(&transfer.from),
        transfer.to.as_deref().map(strip_account_hash_prefix),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::transfer_json;

    const CTX: TransferContext<'static> = TransferContext {
        transfer_hash: "t1",
        block_hash: "b100",
        deploy_hash: "d1",
        state_root_hash: "root-100",
        deploy_timestamp: "2021-04-01T12:00:00.000Z",
    };

    fn result(to: Option<&str>, amount: &str) -> (TransferResult, Vec<u8>) {
        let json = transfer_json("d1", to, amount);
        let raw = serde_json::to_vec(&json).unwrap();
        (serde_json::from_value(json).unwrap(), raw)
    }

    #[test]
    fn test_parse_transfer() {
        let (transfer, raw) = result(Some("account-hash-bb"), "2500000000");
        let row = parse_transfer(&transfer, &raw, CTX).unwrap();

        assert_eq!(row.transfer_hash, "t1");
        assert_eq!(row.deploy_hash, "d1");
        assert_eq!(row.amount, Decimal::from(2_500_000_000u64));
        assert_eq!(row.gas, Decimal::ZERO);
        assert_eq!(row.transfer_id, Some(Decimal::from(7)));
        assert_eq!(row.to.as_deref(), Some("account-hash-bb"));
    }

    #[test]
    fn test_unparsed_amount_is_rejected() {
        let (transfer, raw) = result(Some("account-hash-bb"), "2.5e9");
        assert!(matches!(
            parse_transfer(&transfer, &raw, CTX),
            Err(IndexerError::Parse(_))
        ));
    }

    #[test]
    fn test_account_hashes() {
        let (transfer, _) = result(Some("account-hash-bb"), "1");
        assert_eq!(
            account_hashes(&transfer),
            ("aa".to_string(), Some("bb".to_string()))
        );

        let (to_purse, _) = result(None, "1");
        assert_eq!(account_hashes(&to_purse), ("aa".to_string(), None));
    }
}
