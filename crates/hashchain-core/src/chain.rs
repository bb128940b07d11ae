use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::block::{Block, BlockData};
use crate::config::{cap_difficulty, check_difficulty, ChainConfig};
use crate::constants::{GENESIS_DATA, GENESIS_PREVIOUS_HASH, TAMPERED_DATA};
use crate::error::{ChainError, Result};
use crate::hash::meets_difficulty;
use crate::mine::{CancelSignal, CancelToken, Miner, MiningStrategy, Uninterruptible};
use crate::snapshot;

/// Outcome of checking one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockCheck {
    Valid,
    /// Stored hash differs from the hash of the block's current fields.
    HashMismatch { stored: String, calculated: String },
    /// `previous_hash` differs from the predecessor's stored hash.
    BrokenLink { stored: String, expected: String },
    /// Hash is consistent but lacks the leading zeros its difficulty demands.
    InsufficientWork { hash: String, difficulty: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockVerdict {
    pub index: u64,
    pub check: BlockCheck,
}

impl BlockVerdict {
    pub fn is_valid(&self) -> bool {
        self.check == BlockCheck::Valid
    }
}

impl fmt::Display for BlockVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.check {
            BlockCheck::Valid => write!(f, "[Block {}] Valid.", self.index),
            BlockCheck::HashMismatch { stored, calculated } => write!(
                f,
                "[Block {}] Invalid hash! Stored: {stored}, Calculated: {calculated}",
                self.index
            ),
            BlockCheck::BrokenLink { stored, expected } => write!(
                f,
                "[Block {}] Invalid previous hash! Stored: {stored}, Expected: {expected}",
                self.index
            ),
            BlockCheck::InsufficientWork { hash, difficulty } => write!(
                f,
                "[Block {}] Insufficient work! Hash {hash} lacks {difficulty} leading zeros",
                self.index
            ),
        }
    }
}

/// Per-block results of [`Chain::validate`], genesis excluded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub verdicts: Vec<BlockVerdict>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.verdicts.iter().all(BlockVerdict::is_valid)
    }

    pub fn failures(&self) -> impl Iterator<Item = &BlockVerdict> {
        self.verdicts.iter().filter(|v| !v.is_valid())
    }

    pub fn verdict(&self, index: u64) -> Option<&BlockVerdict> {
        self.verdicts.iter().find(|v| v.index == index)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub index: u64,
    pub data: BlockData,
}

/// An in-memory chain of mined blocks. Always holds at least the genesis
/// block.
#[derive(Clone, Debug)]
pub struct Chain {
    difficulty: u32,
    strategy: MiningStrategy,
    blocks: Vec<Block>,
}

impl Chain {
    /// Mines the genesis block at `difficulty` and starts a chain with it.
    /// Difficulty is capped at `MAX_DIFFICULTY`; use
    /// [`Chain::with_config`] to reject larger values instead.
    pub fn new(difficulty: u32) -> Self {
        let difficulty = cap_difficulty(difficulty);
        let genesis = Block::new(0, GENESIS_DATA, GENESIS_PREVIOUS_HASH, difficulty);
        Self {
            difficulty,
            strategy: MiningStrategy::Sequential,
            blocks: vec![genesis],
        }
    }

    pub fn with_config(config: ChainConfig) -> Result<Self> {
        config.validate()?;
        let genesis = match Block::mined_with(
            0,
            GENESIS_DATA,
            GENESIS_PREVIOUS_HASH,
            &config.miner(),
            &Uninterruptible,
        ) {
            Ok(block) => block,
            Err(never) => match never {},
        };
        Ok(Self {
            difficulty: config.difficulty,
            strategy: config.strategy,
            blocks: vec![genesis],
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Changes the difficulty used for blocks appended from now on. Existing
    /// headers keep the difficulty they were mined under.
    pub fn set_difficulty(&mut self, difficulty: u32) -> Result<()> {
        check_difficulty(difficulty)?;
        self.difficulty = difficulty;
        Ok(())
    }

    pub fn strategy(&self) -> MiningStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: MiningStrategy) {
        self.strategy = strategy;
    }

    pub fn miner(&self) -> Miner {
        Miner::new(self.difficulty, self.strategy)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; kept alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn tail(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Mines a block carrying `data` on top of the tail and appends it.
    /// Blocks until a nonce is found.
    pub fn append(&mut self, data: impl Into<BlockData>) -> &Block {
        match self.append_with(data, &Uninterruptible) {
            Ok(_) => self.tail(),
            Err(never) => match never {},
        }
    }

    /// Like [`Chain::append`] but abandons the search when `cancel` fires.
    /// A cancelled append leaves the chain exactly as it was.
    pub fn append_cancellable(
        &mut self,
        data: impl Into<BlockData>,
        cancel: &CancelToken,
    ) -> Result<&Block> {
        match self.append_with(data, cancel) {
            Ok(_) => Ok(self.tail()),
            Err(err) => {
                debug!(len = self.blocks.len(), "append cancelled");
                Err(err.into())
            }
        }
    }

    fn append_with<C: CancelSignal>(
        &mut self,
        data: impl Into<BlockData>,
        signal: &C,
    ) -> std::result::Result<(), C::Error> {
        let index = self.blocks.len() as u64;
        let previous_hash = self.tail().hash_hex().to_string();
        let block = Block::mined_with(index, data, previous_hash, &self.miner(), signal)?;
        debug!(index, "appending block");
        self.blocks.push(block);
        Ok(())
    }

    /// Rechecks every block after genesis against its stored hash and its
    /// predecessor. Never stops at the first failure.
    pub fn validate(&self) -> ValidationReport {
        let verdicts = self
            .blocks
            .windows(2)
            .map(|pair| {
                let (previous, current) = (&pair[0], &pair[1]);
                let verdict = BlockVerdict {
                    index: current.header.index,
                    check: check_block(current, previous),
                };
                if verdict.is_valid() {
                    debug!("{verdict}");
                } else {
                    warn!("{verdict}");
                }
                verdict
            })
            .collect();
        ValidationReport { verdicts }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_valid()
    }

    /// Case-insensitive substring search over every block's textual data.
    pub fn search(&self, keyword: &str) -> Vec<SearchHit> {
        let needle = keyword.to_lowercase();
        self.blocks
            .iter()
            .filter(|b| b.data.to_string().to_lowercase().contains(&needle))
            .map(|b| SearchHit {
                index: b.header.index,
                data: b.data.clone(),
            })
            .collect()
    }

    /// Overwrites a block's data without touching its hash or nonce, so the
    /// next validation flags it. Genesis cannot be tampered.
    pub fn tamper(&mut self, index: usize) -> Result<()> {
        let len = self.blocks.len();
        if index == 0 || index >= len {
            return Err(ChainError::InvalidTamperTarget { index, len });
        }
        self.blocks[index].data = BlockData::from(TAMPERED_DATA);
        warn!(index, "block tampered");
        Ok(())
    }

    /// Writes the whole chain to `sink` in the snapshot format.
    pub fn export<W: Write>(&self, sink: W) -> Result<()> {
        snapshot::write_blocks(&self.blocks, sink)
    }

    pub fn export_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        self.export(&mut writer)?;
        writer.flush()?;
        info!(path = %path.display(), blocks = self.blocks.len(), "chain exported");
        Ok(())
    }

    /// Rebuilds a chain from a snapshot without re-mining. The chain's
    /// difficulty is taken from the last block. Call [`Chain::validate`] to
    /// find out whether the file was edited.
    pub fn import<R: Read>(source: R) -> Result<Self> {
        let blocks = snapshot::read_blocks(source)?;
        let difficulty = blocks
            .last()
            .map(|b| b.header.difficulty)
            .unwrap_or_default();
        check_difficulty(difficulty)?;
        Ok(Self {
            difficulty,
            strategy: MiningStrategy::Sequential,
            blocks,
        })
    }

    pub fn import_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let chain = Self::import(BufReader::new(File::open(path)?))?;
        info!(path = %path.display(), blocks = chain.len(), "chain imported");
        Ok(chain)
    }
}

fn check_block(current: &Block, previous: &Block) -> BlockCheck {
    let calculated = current.calculate_hash();
    if current.hash_hex() != calculated {
        BlockCheck::HashMismatch {
            stored: current.hash_hex().to_string(),
            calculated,
        }
    } else if current.header.previous_hash != previous.hash_hex() {
        BlockCheck::BrokenLink {
            stored: current.header.previous_hash.clone(),
            expected: previous.hash_hex().to_string(),
        }
    } else if !meets_difficulty(&calculated, current.header.difficulty) {
        BlockCheck::InsufficientWork {
            hash: calculated,
            difficulty: current.header.difficulty,
        }
    } else {
        BlockCheck::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_block_example() {
        let chain = Chain::new(1);
        let genesis = chain.genesis();
        assert_eq!(chain.len(), 1);
        assert_eq!(genesis.header.index, 0);
        assert_eq!(genesis.header.previous_hash, "0");
        assert_eq!(genesis.data, BlockData::from("Genesis Block"));
        assert!(meets_difficulty(genesis.hash_hex(), 1));
    }

    #[test]
    fn fresh_chain_is_valid_with_empty_report() {
        let chain = Chain::new(2);
        let report = chain.validate();
        assert!(report.is_valid());
        assert!(report.verdicts.is_empty());
    }

    #[test]
    fn append_links_to_tail() {
        let mut chain = Chain::new(1);
        let genesis_hash = chain.tail().hash_hex().to_string();
        let block = chain.append("first");
        assert_eq!(block.header.index, 1);
        assert_eq!(block.header.previous_hash, genesis_hash);
        assert_eq!(block.header.difficulty, 1);
        chain.append("second");
        for i in 1..chain.len() {
            assert_eq!(
                chain.blocks()[i].header.previous_hash,
                chain.blocks()[i - 1].hash_hex()
            );
            assert_eq!(chain.blocks()[i].header.index, i as u64);
        }
        assert!(chain.is_valid());
    }

    #[test]
    fn cancelled_append_leaves_chain_untouched() {
        let mut chain = Chain::new(1);
        let token = CancelToken::new();
        token.cancel();
        let err = chain.append_cancellable("dropped", &token).unwrap_err();
        assert!(matches!(err, ChainError::Cancelled));
        assert_eq!(chain.len(), 1);
        assert!(chain.is_valid());
    }

    #[test]
    fn tamper_is_detected_as_hash_mismatch() {
        let mut chain = Chain::new(1);
        chain.append("one");
        chain.append("two");
        chain.tamper(1).unwrap();
        assert_eq!(chain.blocks()[1].data, BlockData::from(TAMPERED_DATA));
        let report = chain.validate();
        assert!(!report.is_valid());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 1);
        assert!(matches!(failures[0].check, BlockCheck::HashMismatch { .. }));
        assert_eq!(report.verdict(2).map(|v| &v.check), Some(&BlockCheck::Valid));
    }

    #[test]
    fn tamper_rejects_genesis_and_out_of_range() {
        let mut chain = Chain::new(1);
        chain.append("one");
        let before: Vec<_> = chain.blocks().to_vec();
        assert!(matches!(
            chain.tamper(0),
            Err(ChainError::InvalidTamperTarget { index: 0, len: 2 })
        ));
        assert!(matches!(
            chain.tamper(2),
            Err(ChainError::InvalidTamperTarget { index: 2, len: 2 })
        ));
        assert_eq!(chain.blocks(), before.as_slice());
        assert!(chain.is_valid());
    }

    #[test]
    fn rewritten_previous_hash_is_broken_link() {
        let mut chain = Chain::new(0);
        chain.append("one");
        chain.append("two");
        // Rewrite block 1 with a recomputed hash; block 2 still points at the old one.
        let b1 = &mut chain.blocks[1];
        b1.data = BlockData::from("forged");
        b1.header.hash = Some(b1.calculate_hash());
        let report = chain.validate();
        assert_eq!(report.verdict(1).map(|v| &v.check), Some(&BlockCheck::Valid));
        assert!(matches!(
            report.verdict(2).map(|v| &v.check),
            Some(BlockCheck::BrokenLink { .. })
        ));
    }

    #[test]
    fn recomputed_hash_without_work_is_flagged() {
        let mut chain = Chain::new(2);
        chain.append("one");
        let b1 = &mut chain.blocks[1];
        // Walk nonces until the hash is consistent but fails the difficulty.
        let mut nonce = 0;
        loop {
            b1.header.nonce = nonce;
            let h = b1.calculate_hash();
            if !meets_difficulty(&h, 2) {
                b1.header.hash = Some(h);
                break;
            }
            nonce += 1;
        }
        let report = chain.validate();
        assert!(matches!(
            report.verdict(1).map(|v| &v.check),
            Some(BlockCheck::InsufficientWork { difficulty: 2, .. })
        ));
    }

    #[test]
    fn validation_reports_every_failing_block() {
        let mut chain = Chain::new(1);
        for i in 0..4 {
            chain.append(format!("block {i}"));
        }
        chain.tamper(1).unwrap();
        chain.tamper(3).unwrap();
        let report = chain.validate();
        assert_eq!(report.verdicts.len(), 4);
        let failed: Vec<u64> = report.failures().map(|v| v.index).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[test]
    fn search_is_case_insensitive_and_returns_all_hits() {
        let mut chain = Chain::new(1);
        chain.append("Alice pays Bob 5");
        chain.append("Bob pays Carol 3");
        let hits = chain.search("BOB");
        let indices: Vec<u64> = hits.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(chain.search("dave").is_empty());
        assert_eq!(chain.search("genesis").len(), 1);
    }

    #[test]
    fn search_matches_record_and_bytes_text() {
        let mut chain = Chain::new(0);
        chain.append(json!({"from": "alice", "memo": "Rent"}));
        chain.append(vec![0xcau8, 0xfe]);
        assert_eq!(chain.search("rent")[0].index, 1);
        assert_eq!(chain.search("CAFE")[0].index, 2);
    }

    #[test]
    fn set_difficulty_applies_to_new_blocks_only() {
        let mut chain = Chain::new(1);
        chain.set_difficulty(2).unwrap();
        let block = chain.append("harder");
        assert_eq!(block.header.difficulty, 2);
        assert!(meets_difficulty(block.hash_hex(), 2));
        assert_eq!(chain.genesis().header.difficulty, 1);
        assert!(chain.is_valid());
        assert!(chain.set_difficulty(65).is_err());
        assert_eq!(chain.difficulty(), 2);
    }

    #[test]
    fn parallel_config_builds_valid_chain() {
        let mut chain = Chain::with_config(ChainConfig::with_difficulty(2).parallel(true)).unwrap();
        assert_eq!(chain.strategy(), MiningStrategy::Parallel);
        chain.append("parallel");
        assert!(chain.is_valid());
    }

    #[test]
    fn with_config_rejects_bad_difficulty() {
        let err = Chain::with_config(ChainConfig::with_difficulty(100)).unwrap_err();
        assert!(matches!(err, ChainError::InvalidConfig(_)));
    }

    #[test]
    fn verdict_display_matches_report_lines() {
        let v = BlockVerdict {
            index: 3,
            check: BlockCheck::BrokenLink {
                stored: "aa".into(),
                expected: "bb".into(),
            },
        };
        assert_eq!(
            v.to_string(),
            "[Block 3] Invalid previous hash! Stored: aa, Expected: bb"
        );
    }
}
