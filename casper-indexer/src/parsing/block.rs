use super::{parse_timestamp, raw_text, to_bigint};
use crate::chain::{BlockBody, BlockResult};
use crate::models::BlockRow;
use crate::IndexerError;

pub fn parse_block(result: &BlockResult, raw: &[u8]) -> Result<BlockRow, IndexerError> {
    let block = &result.block;
    let header = &block.header;

    Ok(BlockRow {
        hash: block.hash.clone(),
        parent_hash: header.parent_hash.clone(),
        state_root_hash: header.state_root_hash.clone(),
        era_id: to_bigint("era_id", header.era_id)?,
        height: to_bigint("height", header.height)?,
        timestamp: parse_timestamp(&header.timestamp)?,
        era_end: is_era_end(result),
        proposer: block.body.proposer.clone(),
        deploy_count: count("deploy_hashes", block.body.deploy_hashes.len())?,
        transfer_count: count("transfer_hashes", block.body.transfer_hashes.len())?,
        raw: raw_text(raw),
    })
}

pub fn is_era_end(result: &BlockResult) -> bool {
    result
        .block
        .header
        .era_end
        .as_ref()
        .map_or(false, |v| !v.is_null())
}

/// Every deploy the block references: transfer hashes first, then deploy hashes
pub fn referenced_hashes(body: &BlockBody) -> Vec<String> {
    body.transfer_hashes
        .iter()
        .chain(body.deploy_hashes.iter())
        .cloned()
        .collect()
}

/// Re-read a stored raw payload
pub fn parse_stored_block(raw: &str) -> Result<BlockResult, IndexerError> {
    serde_json::from_str(raw)
        .map_err(|e| IndexerError::Parse(format!("stored block payload: {}", e)))
}

fn count(field: &str, len: usize) -> Result<i32, IndexerError> {
    i32::try_from(len).map_err(|_| IndexerError::Parse(format!("{} too long: {}", field, len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::block_json;

    fn block(era_end: bool) -> (BlockResult, Vec<u8>) {
        let json = block_json(100, "b100", &["d1", "d2"], &["t1"], era_end);
        let raw = serde_json::to_vec(&json).unwrap();
        (serde_json::from_value(json).unwrap(), raw)
    }

    #[test]
    fn test_parse_block() {
        let (result, raw) = block(false);
        let row = parse_block(&result, &raw).unwrap();

        assert_eq!(row.hash, "b100");
        assert_eq!(row.height, 100);
        assert_eq!(row.era_id, 12);
        assert!(!row.era_end);
        assert_eq!(row.deploy_count, 2);
        assert_eq!(row.transfer_count, 1);
        assert_eq!(row.timestamp.to_rfc3339(), "2021-04-01T12:00:00+00:00");
    }

    #[test]
    fn test_era_end_flag() {
        let (result, raw) = block(true);
        assert!(parse_block(&result, &raw).unwrap().era_end);
    }

    #[test]
    fn test_referenced_hashes_order() {
        let (result, _) = block(false);
        assert_eq!(referenced_hashes(&result.block.body), vec!["t1", "d1", "d2"]);
    }

    #[test]
    fn test_stored_payload_round_trip() {
        let (result, raw) = block(false);
        let row = parse_block(&result, &raw).unwrap();
        let reread = parse_stored_block(&row.raw).unwrap();
        assert_eq!(reread.block.body.deploy_hashes, vec!["d1", "d2"]);
    }

    #[test]
    fn test_bad_timestamp_is_parse_error() {
        let mut json = block_json(1, "b1", &[], &[], false);
        json["block"]["header"]["timestamp"] = "not a time".into();
        let result: BlockResult = serde_json::from_value(json).unwrap();
        assert!(matches!(
            parse_block(&result, b"{}"),
            Err(IndexerError::Parse(_))
        ));
    }
}
