//! A single-node proof-of-work hash chain.
//!
//! Blocks are sealed by searching for a nonce whose SHA-256 hash starts
//! with `difficulty` zero hex characters, and each block stores the hash of
//! its predecessor. [`Chain`] appends, validates, searches, tampers with and
//! snapshots blocks; [`SharedChain`] runs the same chain with mining moved
//! to a cancellable worker.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod mine;
pub mod snapshot;
pub mod worker;

pub use block::{Block, BlockData, BlockHeader};
pub use chain::{BlockCheck, BlockVerdict, Chain, SearchHit, ValidationReport};
pub use config::ChainConfig;
pub use error::{ChainError, MineError};
pub use mine::{CancelToken, MinedSeal, Miner, MiningStrategy};
pub use snapshot::BlockRecord;
pub use worker::{PendingAppend, SharedChain};
