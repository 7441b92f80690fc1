use super::parse_amount;
use crate::chain::AuctionState;
use crate::models::{AuctionBatch, BidRow, DelegatorRow};
use crate::IndexerError;

/// Build the full bid and delegator batch. The first amount that fails to
/// parse rejects the whole snapshot.
pub fn parse_auction(state: &AuctionState) -> Result<AuctionBatch, IndexerError> {
    let mut batch = AuctionBatch::default();

    for entry in &state.bids {
        let bid = &entry.bid;
        let staked_amount = parse_amount("staked_amount", &bid.staked_amount).map_err(|e| {
            IndexerError::Parse(format!("bid of {}: {}", entry.public_key, e))
        })?;

        batch.bids.push(BidRow {
            public_key: entry.public_key.clone(),
            bonding_purse: bid.bonding_purse.clone(),
            staked_amount,
            delegation_rate: i16::from(bid.delegation_rate),
            inactive: bid.inactive,
        });

        for delegator in &bid.delegators {
            let staked_amount = parse_amount("staked_amount", &delegator.staked_amount)
                .map_err(|e| {
                    IndexerError::Parse(format!(
                        "delegator {} to {}: {}",
                        delegator.public_key, delegator.delegatee, e
                    ))
                })?;

            batch.delegators.push(DelegatorRow {
                public_key: delegator.public_key.clone(),
                delegatee: delegator.delegatee.clone(),
                staked_amount,
                bonding_purse: delegator.bonding_purse.clone(),
            });
        }
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::AuctionResult;
    use crate::fixtures::{auction_json, bid_json, delegator_json};
    use rust_decimal::Decimal;
    use serde_json::{json, Value as JsonValue};

    fn state(bids: JsonValue) -> AuctionState {
        let result: AuctionResult = serde_json::from_value(auction_json(100, bids)).unwrap();
        result.auction_state
    }

    #[test]
    fn test_parse_auction() {
        let state = state(json!([
            bid_json("01v1", "1000", json!([
                delegator_json("01d1", "01v1", "10"),
                delegator_json("01d2", "01v1", "20")
            ])),
            bid_json("01v2", "18446744073709551616", json!([]))
        ]));
        let batch = parse_auction(&state).unwrap();

        assert_eq!(batch.bids.len(), 2);
        assert_eq!(batch.delegators.len(), 2);
        assert_eq!(batch.bids[0].delegation_rate, 10);
        assert_eq!(batch.delegators[1].staked_amount, Decimal::from(20));
        assert_eq!(
            batch.bids[1].staked_amount.to_string(),
            "18446744073709551616"
        );
    }

    #[test]
    fn test_bad_bid_names_validator() {
        let state = state(json!([
            bid_json("01v1", "1000", json!([])),
            bid_json("01v2", "many", json!([]))
        ]));
        let err = parse_auction(&state).unwrap_err();
        assert!(matches!(err, IndexerError::Parse(_)));
        assert!(err.to_string().contains("01v2"));
    }

    #[test]
    fn test_bad_delegator_names_both_keys() {
        let state = state(json!([bid_json(
            "01v1",
            "1000",
            json!([delegator_json("01d9", "01v1", "-1")])
        )]));
        let err = parse_auction(&state).unwrap_err().to_string();
        assert!(err.contains("01d9"));
        assert!(err.contains("01v1"));
    }
}
