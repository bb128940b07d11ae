pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Difficulty used by `Chain::new` callers that have no preference.
pub const DEFAULT_DIFFICULTY: u32 = 2;
/// Difficulty the interactive front ends start with.
pub const SHELL_DIFFICULTY: u32 = 3;
/// A hex digest has 64 characters, so more leading zeros can never match.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_SIZE as u32;
pub const GENESIS_DATA: &str = "Genesis Block";
pub const GENESIS_PREVIOUS_HASH: &str = "0";
pub const TAMPERED_DATA: &str = "Tampered Data";
pub const DEFAULT_EXPORT_FILE: &str = "blockchain.json";
/// Sentinel written to `mining_time` for blocks that were never mined.
pub const MINING_TIME_NA: &str = "N/A";
/// How many nonces the miner tries between checks of its cancel token.
pub const CANCEL_POLL_INTERVAL: u64 = 4096;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
