use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::block::{BlockData, BlockHeader};
use crate::config::cap_difficulty;
use crate::constants::CANCEL_POLL_INTERVAL;
use crate::error::MineError;
use crate::hash::{leading_zero_nibbles, PreparedHasher};

/// Nonces handed to rayon per round of the parallel search.
const PARALLEL_BATCH: u64 = 1 << 16;

/// Result of a successful search.
#[derive(Clone, Debug, PartialEq)]
pub struct MinedSeal {
    pub hash: String,
    pub nonce: u64,
    pub elapsed: Duration,
}

impl MinedSeal {
    /// Elapsed search time in seconds, rounded to 4 decimals.
    pub fn mining_time_secs(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 10_000.0).round() / 10_000.0
    }
}

/// Something the miner polls to decide whether to give up.
pub trait CancelSignal: Sync {
    type Error;
    fn check(&self) -> Result<(), Self::Error>;
}

/// Never fires; searches driven by it cannot fail.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uninterruptible;

impl CancelSignal for Uninterruptible {
    type Error = Infallible;

    fn check(&self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Shared flag used to abandon a running search.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl CancelSignal for CancelToken {
    type Error = MineError;

    fn check(&self) -> Result<(), MineError> {
        if self.is_cancelled() {
            Err(MineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiningStrategy {
    #[default]
    Sequential,
    /// Split the nonce space across the rayon pool. Still returns the
    /// smallest winning nonce, so results match the sequential search.
    Parallel,
}

/// Difficulty plus search strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Miner {
    pub difficulty: u32,
    pub strategy: MiningStrategy,
}

impl Miner {
    pub fn new(difficulty: u32, strategy: MiningStrategy) -> Self {
        Self { difficulty, strategy }
    }

    pub fn sequential(difficulty: u32) -> Self {
        Self::new(difficulty, MiningStrategy::Sequential)
    }

    pub fn parallel(difficulty: u32) -> Self {
        Self::new(difficulty, MiningStrategy::Parallel)
    }

    pub fn seal<C: CancelSignal>(
        &self,
        header: &BlockHeader,
        data: &BlockData,
        signal: &C,
    ) -> Result<MinedSeal, C::Error> {
        let prepared =
            PreparedHasher::new(header.index, &header.timestamp, data, &header.previous_hash);
        let difficulty = cap_difficulty(self.difficulty);
        let start = Instant::now();
        let (nonce, digest) = match self.strategy {
            MiningStrategy::Sequential => search_sequential(&prepared, difficulty, signal)?,
            MiningStrategy::Parallel => search_parallel(&prepared, difficulty, signal)?,
        };
        Ok(MinedSeal {
            hash: hex::encode(digest),
            nonce,
            elapsed: start.elapsed(),
        })
    }
}

/// Mine by incrementing the nonce from 0 until the hex hash starts with
/// `difficulty` zero characters. Unbounded and blocking.
pub fn mine(header: &BlockHeader, data: &BlockData, difficulty: u32) -> MinedSeal {
    match Miner::sequential(difficulty).seal(header, data, &Uninterruptible) {
        Ok(seal) => seal,
        Err(never) => match never {},
    }
}

/// Like [`mine`], but returns `MineError::Cancelled` once `cancel` fires.
pub fn mine_with_cancel(
    header: &BlockHeader,
    data: &BlockData,
    difficulty: u32,
    cancel: &CancelToken,
) -> Result<MinedSeal, MineError> {
    Miner::sequential(difficulty).seal(header, data, cancel)
}

pub fn mine_parallel(header: &BlockHeader, data: &BlockData, difficulty: u32) -> MinedSeal {
    match Miner::parallel(difficulty).seal(header, data, &Uninterruptible) {
        Ok(seal) => seal,
        Err(never) => match never {},
    }
}

fn search_sequential<C: CancelSignal>(
    prepared: &PreparedHasher,
    difficulty: u32,
    signal: &C,
) -> Result<(u64, [u8; 32]), C::Error> {
    let mut nonce = 0u64;
    loop {
        if nonce % CANCEL_POLL_INTERVAL == 0 {
            signal.check()?;
        }
        let digest = prepared.digest_with_nonce(nonce);
        if leading_zero_nibbles(&digest) >= difficulty {
            return Ok((nonce, digest));
        }
        nonce = nonce.wrapping_add(1);
    }
}

fn search_parallel<C: CancelSignal>(
    prepared: &PreparedHasher,
    difficulty: u32,
    signal: &C,
) -> Result<(u64, [u8; 32]), C::Error> {
    let mut start = 0u64;
    loop {
        signal.check()?;
        let end = start.saturating_add(PARALLEL_BATCH);
        // Batches run in order and `find_first` keeps the lowest hit in each.
        let found = (start..end)
            .into_par_iter()
            .map(|nonce| (nonce, prepared.digest_with_nonce(nonce)))
            .find_first(|(_, digest)| leading_zero_nibbles(digest) >= difficulty);
        if let Some(hit) = found {
            return Ok(hit);
        }
        start = if end == u64::MAX { 0 } else { end };
    }
}
