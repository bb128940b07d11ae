use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::config::cap_difficulty;
use crate::constants::TIMESTAMP_FORMAT;
use crate::hash::block_hash;
use crate::mine::{self, CancelSignal, MinedSeal, Miner};

/// Key used to carry raw bytes through the JSON export.
const BYTES_KEY: &str = "bytes_hex";
/// Wraps records whose bare JSON would read back as another variant.
const RECORD_KEY: &str = "record";

const TAG_TEXT: u8 = 0x01;
const TAG_RECORD: u8 = 0x02;
const TAG_BYTES: u8 = 0x03;

/// Opaque block payload.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockData {
    Text(String),
    Record(Value),
    Bytes(Vec<u8>),
}

impl BlockData {
    /// Bytes fed to the hasher: a variant tag followed by the payload.
    /// Records are written as compact JSON; `serde_json::Map` keeps keys
    /// sorted, so equal records always encode identically.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let (tag, body) = match self {
            BlockData::Text(s) => (TAG_TEXT, s.as_bytes().to_vec()),
            BlockData::Record(v) => (TAG_RECORD, v.to_string().into_bytes()),
            BlockData::Bytes(b) => (TAG_BYTES, b.clone()),
        };
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(tag);
        out.extend_from_slice(&body);
        out
    }

    /// JSON form used in exported snapshots. Text is a bare string, bytes
    /// are `{"bytes_hex": "<hex>"}`, and records are written as-is unless
    /// they are a string or a single-key object under a reserved key, in
    /// which case they are wrapped as `{"record": <value>}`.
    pub fn to_json(&self) -> Value {
        match self {
            BlockData::Text(s) => Value::String(s.clone()),
            BlockData::Record(v) if is_ambiguous_record(v) => {
                single_key(RECORD_KEY, v.clone())
            }
            BlockData::Record(v) => v.clone(),
            BlockData::Bytes(b) => single_key(BYTES_KEY, Value::String(hex::encode(b))),
        }
    }

    /// Inverse of [`BlockData::to_json`].
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(s) => BlockData::Text(s),
            Value::Object(mut map) if map.len() == 1 => {
                if let Some(Value::String(h)) = map.get(BYTES_KEY) {
                    if let Ok(bytes) = hex::decode(h) {
                        return BlockData::Bytes(bytes);
                    }
                }
                match map.remove(RECORD_KEY) {
                    Some(inner) => BlockData::Record(inner),
                    None => BlockData::Record(Value::Object(map)),
                }
            }
            other => BlockData::Record(other),
        }
    }
}

fn is_ambiguous_record(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Object(map) if map.len() == 1 => {
            map.contains_key(BYTES_KEY) || map.contains_key(RECORD_KEY)
        }
        _ => false,
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Textual form, used for search and display.
impl fmt::Display for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockData::Text(s) => f.write_str(s),
            BlockData::Record(v) => write!(f, "{v}"),
            BlockData::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}

impl Serialize for BlockData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlockData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(BlockData::from_json)
    }
}

impl From<&str> for BlockData {
    fn from(s: &str) -> Self {
        BlockData::Text(s.to_string())
    }
}

impl From<String> for BlockData {
    fn from(s: String) -> Self {
        BlockData::Text(s)
    }
}

impl From<Value> for BlockData {
    fn from(v: Value) -> Self {
        BlockData::from_json(v)
    }
}

impl From<Vec<u8>> for BlockData {
    fn from(b: Vec<u8>) -> Self {
        BlockData::Bytes(b)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub index: u64,
    pub timestamp: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub difficulty: u32,
    /// `None` until mining completes.
    pub hash: Option<String>,
}

impl BlockHeader {
    pub fn new(index: u64, previous_hash: impl Into<String>, difficulty: u32) -> Self {
        Self {
            index,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            previous_hash: previous_hash.into(),
            nonce: 0,
            difficulty,
            hash: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub data: BlockData,
    /// Seconds spent searching for the nonce.
    pub mining_time: Option<f64>,
}

impl Block {
    /// Builds and mines a block. Blocks until a nonce is found. Difficulty
    /// is capped at `MAX_DIFFICULTY`.
    pub fn new(
        index: u64,
        data: impl Into<BlockData>,
        previous_hash: impl Into<String>,
        difficulty: u32,
    ) -> Self {
        let difficulty = cap_difficulty(difficulty);
        let mut block = Self::draft(index, data, previous_hash, difficulty);
        let seal = mine::mine(&block.header, &block.data, difficulty);
        block.seal(seal);
        block
    }

    /// Builds and mines a block with `miner`, giving up when `signal` fires.
    pub fn mined_with<C: CancelSignal>(
        index: u64,
        data: impl Into<BlockData>,
        previous_hash: impl Into<String>,
        miner: &Miner,
        signal: &C,
    ) -> Result<Self, C::Error> {
        let mut block = Self::draft(index, data, previous_hash, cap_difficulty(miner.difficulty));
        let seal = miner.seal(&block.header, &block.data, signal)?;
        block.seal(seal);
        Ok(block)
    }

    /// An unmined block: nonce 0, no hash, no mining time.
    pub fn draft(
        index: u64,
        data: impl Into<BlockData>,
        previous_hash: impl Into<String>,
        difficulty: u32,
    ) -> Self {
        Self {
            header: BlockHeader::new(index, previous_hash, difficulty),
            data: data.into(),
            mining_time: None,
        }
    }

    fn seal(&mut self, seal: MinedSeal) {
        self.header.nonce = seal.nonce;
        self.mining_time = Some(seal.mining_time_secs());
        tracing::info!(
            index = self.header.index,
            nonce = seal.nonce,
            hash = %seal.hash,
            mining_time = ?seal.elapsed,
            "mined block"
        );
        self.header.hash = Some(seal.hash);
    }

    /// Recomputes the hash from the block's current fields.
    pub fn calculate_hash(&self) -> String {
        block_hash(
            self.header.index,
            &self.header.timestamp,
            &self.data,
            &self.header.previous_hash,
            self.header.nonce,
        )
    }

    /// Stored hash, or `""` for an unmined block.
    pub fn hash_hex(&self) -> &str {
        self.header.hash.as_deref().unwrap_or("")
    }

    pub fn is_mined(&self) -> bool {
        self.header.hash.is_some()
    }
}
