use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use crate::error::{ChainError, Result};
use crate::mine::{Miner, MiningStrategy};

/// Settings fixed when a chain is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Leading zero hex characters required of every new block hash.
    pub difficulty: u32,
    pub strategy: MiningStrategy,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            strategy: MiningStrategy::Sequential,
        }
    }
}

impl ChainConfig {
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.strategy = if parallel {
            MiningStrategy::Parallel
        } else {
            MiningStrategy::Sequential
        };
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_difficulty(self.difficulty)
    }

    pub fn miner(&self) -> Miner {
        Miner::new(self.difficulty, self.strategy)
    }
}

/// Difficulties past the digest length can never be met; the infallible
/// constructors cap them instead of searching forever.
pub(crate) fn cap_difficulty(difficulty: u32) -> u32 {
    difficulty.min(MAX_DIFFICULTY)
}

pub(crate) fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidConfig(format!(
            "difficulty {difficulty} exceeds the {MAX_DIFFICULTY} hex characters of a digest"
        )));
    }
    Ok(())
}
