use std::time::Duration;

use thiserror::Error;

/// Failures of the proof-of-work search itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("mining cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// Tamper target was the genesis block or past the tail.
    #[error("cannot tamper block {index}: genesis or out of range (chain length {len})")]
    InvalidTamperTarget { index: usize, len: usize },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("append cancelled before a nonce was found")]
    Cancelled,

    #[error("mining did not finish within {0:?}")]
    MiningTimeout(Duration),

    #[error("mining worker failed: {0}")]
    WorkerFailed(String),
}

impl From<MineError> for ChainError {
    fn from(err: MineError) -> Self {
        match err {
            MineError::Cancelled => ChainError::Cancelled,
        }
    }
}

pub type Result<T, E = ChainError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_mine_maps_to_cancelled_append() {
        let err: ChainError = MineError::Cancelled.into();
        assert!(matches!(err, ChainError::Cancelled));
    }

    #[test]
    fn tamper_error_names_index_and_len() {
        let err = ChainError::InvalidTamperTarget { index: 7, len: 3 };
        let msg = err.to_string();
        assert!(msg.contains("block 7"));
        assert!(msg.contains("length 3"));
    }
}
