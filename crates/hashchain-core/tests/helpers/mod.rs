#![allow(dead_code)]

use std::path::PathBuf;

use hashchain_core::Chain;
use tempfile::{tempdir, TempDir};

pub fn create_temp_file(name: &str) -> (TempDir, PathBuf) {
    // Keep the TempDir alive for as long as the path is used
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().join(name);
    (temp_dir, path)
}

/// The two-payment chain used throughout the scenario tests.
pub fn payments_chain(difficulty: u32) -> Chain {
    let mut chain = Chain::new(difficulty);
    chain.append("Alice pays Bob 5");
    chain.append("Bob pays Carol 3");
    chain
}
