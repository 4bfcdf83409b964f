//! Append-only, hash-linked audit log.
//!
//! Each block fingerprints a JSON snapshot (`data_hash`) and links to its predecessor
//! through `previous_hash`. The block's own `tx_hash` covers its number, event type,
//! data hash, predecessor and timestamp; edits to those fields or the snapshot are
//! detectable. `description`, `entity_type`, `entity_id` and `recorded_by` are
//! descriptive and not hashed.

use serde::Serialize;
use serde_json::Value;

use crate::util::sha256_hex;

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
pub const EVENT_DQI_COMPUTED: &str = "DQI_COMPUTED";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainBlock {
    pub block_number: i64,
    pub tx_hash: String,
    pub event_type: String,
    pub description: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data_snapshot: String,
    pub data_hash: String,
    pub previous_hash: String,
    pub recorded_by: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event_type: String,
    pub description: String,
    pub entity_type: String,
    pub entity_id: String,
    pub snapshot: Value,
    pub recorded_by: String,
}

/// `serde_json::Value` objects serialize with sorted keys.
pub fn canonical_snapshot(snapshot: &Value) -> String {
    snapshot.to_string()
}

pub fn compute_tx_hash(
    block_number: i64,
    event_type: &str,
    data_hash: &str,
    previous_hash: &str,
    recorded_at: &str,
) -> String {
    sha256_hex(format!("{block_number}{event_type}{data_hash}{previous_hash}{recorded_at}").as_bytes())
}

pub fn seal_block(previous: Option<&ChainBlock>, event: PendingEvent, recorded_at: &str) -> ChainBlock {
    let block_number = previous.map_or(1, |block| block.block_number + 1);
    let previous_hash = previous.map_or_else(|| GENESIS_HASH.to_string(), |block| block.tx_hash.clone());
    let data_snapshot = canonical_snapshot(&event.snapshot);
    let data_hash = sha256_hex(data_snapshot.as_bytes());
    let tx_hash = compute_tx_hash(
        block_number,
        &event.event_type,
        &data_hash,
        &previous_hash,
        recorded_at,
    );

    ChainBlock {
        block_number,
        tx_hash,
        event_type: event.event_type,
        description: event.description,
        entity_type: event.entity_type,
        entity_id: event.entity_id,
        data_snapshot,
        data_hash,
        previous_hash,
        recorded_by: event.recorded_by,
        recorded_at: recorded_at.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TamperedBlock {
    pub block_number: i64,
    pub tx_hash: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokenLink {
    pub block_number: i64,
    pub expected_previous: String,
    pub actual_previous: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub total_blocks: usize,
    pub tampered_blocks: Vec<TamperedBlock>,
    pub broken_links: Vec<BrokenLink>,
}

/// Blocks must be ordered by block number.
pub fn verify_chain(blocks: &[ChainBlock]) -> ChainVerification {
    let mut tampered_blocks = Vec::new();
    let mut broken_links = Vec::new();
    let mut expected_previous = GENESIS_HASH.to_string();

    for block in blocks {
        if sha256_hex(block.data_snapshot.as_bytes()) != block.data_hash {
            tampered_blocks.push(TamperedBlock {
                block_number: block.block_number,
                tx_hash: block.tx_hash.clone(),
                reason: "data hash mismatch".to_string(),
            });
        } else if compute_tx_hash(
            block.block_number,
            &block.event_type,
            &block.data_hash,
            &block.previous_hash,
            &block.recorded_at,
        ) != block.tx_hash
        {
            tampered_blocks.push(TamperedBlock {
                block_number: block.block_number,
                tx_hash: block.tx_hash.clone(),
                reason: "transaction hash mismatch".to_string(),
            });
        }

        if block.previous_hash != expected_previous {
            broken_links.push(BrokenLink {
                block_number: block.block_number,
                expected_previous: expected_previous.clone(),
                actual_previous: block.previous_hash.clone(),
            });
        }

        expected_previous = block.tx_hash.clone();
    }

    ChainVerification {
        is_valid: tampered_blocks.is_empty() && broken_links.is_empty(),
        total_blocks: blocks.len(),
        tampered_blocks,
        broken_links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(entity_id: &str, clean_percentage: f64) -> PendingEvent {
        PendingEvent {
            event_type: EVENT_DQI_COMPUTED.to_string(),
            description: format!("DQI scores computed for {entity_id}"),
            entity_type: "Study".to_string(),
            entity_id: entity_id.to_string(),
            snapshot: serde_json::json!({
                "study_id": entity_id,
                "total_subjects": 10,
                "clean_percentage": clean_percentage,
                "composite_score": 12.5,
            }),
            recorded_by: "test".to_string(),
        }
    }

    fn chain_of(count: usize) -> Vec<ChainBlock> {
        let mut blocks: Vec<ChainBlock> = Vec::new();
        for index in 0..count {
            let block = seal_block(
                blocks.last(),
                event("STUDY-1", index as f64 * 10.0),
                &format!("2026-01-0{}T00:00:00Z", index + 1),
            );
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn first_block_links_to_genesis() {
        let blocks = chain_of(1);
        assert_eq!(blocks[0].block_number, 1);
        assert_eq!(blocks[0].previous_hash, GENESIS_HASH);
        assert_eq!(blocks[0].tx_hash.len(), 64);
    }

    #[test]
    fn canonical_snapshot_sorts_keys() {
        let snapshot = serde_json::json!({ "b": 1, "a": 2 });
        assert_eq!(canonical_snapshot(&snapshot), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn untouched_chain_verifies() {
        let verification = verify_chain(&chain_of(4));
        assert!(verification.is_valid);
        assert_eq!(verification.total_blocks, 4);
    }

    #[test]
    fn edited_snapshot_is_reported_as_tampered() {
        let mut blocks = chain_of(3);
        blocks[1].data_snapshot = blocks[1].data_snapshot.replace("10", "99");

        let verification = verify_chain(&blocks);
        assert!(!verification.is_valid);
        assert_eq!(verification.tampered_blocks.len(), 1);
        assert_eq!(verification.tampered_blocks[0].block_number, 2);
        assert!(verification.broken_links.is_empty());
    }

    #[test]
    fn rewritten_block_breaks_the_following_link() {
        let mut blocks = chain_of(3);
        let replacement = seal_block(
            Some(&blocks[0]),
            event("STUDY-1", 55.0),
            "2026-02-01T00:00:00Z",
        );
        blocks[1] = replacement;

        let verification = verify_chain(&blocks);
        assert!(!verification.is_valid);
        assert!(verification.tampered_blocks.is_empty());
        assert_eq!(verification.broken_links.len(), 1);
        assert_eq!(verification.broken_links[0].block_number, 3);
    }

    #[test]
    fn hashed_fields_are_covered_and_descriptive_fields_are_not() {
        let mut blocks = chain_of(2);
        blocks[0].recorded_at = "2030-01-01T00:00:00Z".to_string();
        let verification = verify_chain(&blocks);
        assert_eq!(verification.tampered_blocks.len(), 1);

        let mut blocks = chain_of(2);
        blocks[0].description = "edited".to_string();
        blocks[0].recorded_by = "someone else".to_string();
        assert!(verify_chain(&blocks).is_valid);
    }
}
