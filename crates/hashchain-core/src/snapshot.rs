//! Flat-file snapshot format: a JSON array with one record per block.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockData, BlockHeader};
use crate::error::{ChainError, Result};

/// One exported block. Field names and order are the on-disk format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: String,
    pub nonce: u64,
    pub previous_hash: String,
    pub hash: Option<String>,
    pub difficulty: u32,
    pub data: BlockData,
    #[serde(with = "mining_time", default)]
    pub mining_time: Option<f64>,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        let h = &block.header;
        Self {
            index: h.index,
            timestamp: h.timestamp.clone(),
            nonce: h.nonce,
            previous_hash: h.previous_hash.clone(),
            hash: h.hash.clone(),
            difficulty: h.difficulty,
            data: block.data.clone(),
            mining_time: block.mining_time,
        }
    }
}

impl From<BlockRecord> for Block {
    fn from(r: BlockRecord) -> Self {
        Block {
            header: BlockHeader {
                index: r.index,
                timestamp: r.timestamp,
                previous_hash: r.previous_hash,
                nonce: r.nonce,
                difficulty: r.difficulty,
                hash: r.hash,
            },
            data: r.data,
            mining_time: r.mining_time,
        }
    }
}

/// `mining_time` is a float, or the string `"N/A"` when absent.
mod mining_time {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::constants::MINING_TIME_NA;

    pub fn serialize<S: Serializer>(value: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(secs) => s.serialize_f64(*secs),
            None => s.serialize_str(MINING_TIME_NA),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(f64),
        Sentinel(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Repr>::deserialize(d)? {
            Some(Repr::Seconds(secs)) => Some(secs),
            Some(Repr::Sentinel(_)) | None => None,
        })
    }
}

/// Writes `blocks` as a 4-space indented JSON array.
pub fn write_blocks<W: Write>(blocks: &[Block], sink: W) -> Result<()> {
    let records: Vec<BlockRecord> = blocks.iter().map(BlockRecord::from).collect();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(sink, formatter);
    records.serialize(&mut ser)?;
    Ok(())
}

/// Reads a snapshot back into blocks without re-mining anything.
///
/// Only structure is checked here: the array must be non-empty and indices
/// must run 0, 1, 2, ... in order. Hash and linkage problems are left for
/// `Chain::validate` to report.
pub fn read_blocks<R: Read>(source: R) -> Result<Vec<Block>> {
    let records: Vec<BlockRecord> = serde_json::from_reader(source)?;
    if records.is_empty() {
        return Err(ChainError::MalformedSnapshot("no blocks".into()));
    }
    for (pos, record) in records.iter().enumerate() {
        if record.index != pos as u64 {
            return Err(ChainError::MalformedSnapshot(format!(
                "record {pos} carries index {}",
                record.index
            )));
        }
    }
    Ok(records.into_iter().map(Block::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn sample_block() -> Block {
        Block {
            header: BlockHeader {
                index: 0,
                timestamp: "2024-01-01 00:00:00.000000".into(),
                previous_hash: "0".into(),
                nonce: 17,
                difficulty: 1,
                hash: Some("0abc".into()),
            },
            data: BlockData::from("Genesis Block"),
            mining_time: Some(0.0012),
        }
    }

    #[test]
    fn record_uses_exact_field_names_in_order() {
        let mut out = Vec::new();
        write_blocks(&[sample_block()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let keys = [
            "\"index\"",
            "\"timestamp\"",
            "\"nonce\"",
            "\"previous_hash\"",
            "\"hash\"",
            "\"difficulty\"",
            "\"data\"",
            "\"mining_time\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| text.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
        assert!(text.contains("\n        \"index\": 0"), "{text}");
    }

    #[test]
    fn absent_mining_time_is_written_as_sentinel() {
        let mut block = sample_block();
        block.mining_time = None;
        let mut out = Vec::new();
        write_blocks(&[block], &mut out).unwrap();
        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["mining_time"], json!("N/A"));
    }

    #[test]
    fn sentinel_and_null_mining_time_read_as_absent() {
        let text = r#"[{"index":0,"timestamp":"t","nonce":0,"previous_hash":"0",
            "hash":"ab","difficulty":0,"data":"x","mining_time":"N/A"}]"#;
        let blocks = read_blocks(text.as_bytes()).unwrap();
        assert_eq!(blocks[0].mining_time, None);

        let text = text.replace("\"N/A\"", "null");
        let blocks = read_blocks(text.as_bytes()).unwrap();
        assert_eq!(blocks[0].mining_time, None);
    }

    #[test]
    fn read_rejects_empty_array() {
        let err = read_blocks("[]".as_bytes()).unwrap_err();
        assert!(matches!(err, ChainError::MalformedSnapshot(_)));
    }

    #[test]
    fn read_rejects_out_of_order_indices() {
        let mut second = sample_block();
        second.header.index = 5;
        let mut out = Vec::new();
        write_blocks(&[sample_block(), second], &mut out).unwrap();
        let err = read_blocks(out.as_slice()).unwrap_err();
        assert!(matches!(err, ChainError::MalformedSnapshot(_)));
    }

    #[test]
    fn read_rejects_non_json() {
        let err = read_blocks("not json".as_bytes()).unwrap_err();
        assert!(matches!(err, ChainError::Serialization(_)));
    }
}
