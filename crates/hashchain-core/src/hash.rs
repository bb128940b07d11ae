//! Block hashing.
//!
//! The hashed content is the field sequence `index, timestamp, data,
//! previous_hash, nonce`. Every variable-length field is written as its
//! byte length (u64, little endian) followed by the bytes, and integers are
//! written as 8 little-endian bytes, so no two distinct field sets share an
//! encoding.

use sha2::{Digest, Sha256};

use crate::block::BlockData;

/// Appends `bytes` prefixed by their length.
fn put_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// A SHA-256 state that has already absorbed every field except the nonce.
///
/// The nonce is the last field of the encoding, so the miner can clone this
/// state per attempt instead of re-hashing the payload.
#[derive(Clone)]
pub struct PreparedHasher {
    prefix: Sha256,
}

impl PreparedHasher {
    pub fn new(index: u64, timestamp: &str, data: &BlockData, previous_hash: &str) -> Self {
        let mut prefix = Sha256::new();
        prefix.update(index.to_le_bytes());
        put_field(&mut prefix, timestamp.as_bytes());
        put_field(&mut prefix, &data.canonical_bytes());
        put_field(&mut prefix, previous_hash.as_bytes());
        Self { prefix }
    }

    pub fn digest_with_nonce(&self, nonce: u64) -> [u8; 32] {
        let mut hasher = self.prefix.clone();
        hasher.update(nonce.to_le_bytes());
        hasher.finalize().into()
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        hex::encode(self.digest_with_nonce(nonce))
    }
}

/// Hex SHA-256 of a block's fields.
pub fn block_hash(
    index: u64,
    timestamp: &str,
    data: &BlockData,
    previous_hash: &str,
    nonce: u64,
) -> String {
    PreparedHasher::new(index, timestamp, data, previous_hash).hash_with_nonce(nonce)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Number of leading `'0'` characters in a hex string.
pub fn leading_zero_chars(hex: &str) -> u32 {
    hex.bytes().take_while(|b| *b == b'0').count() as u32
}

/// Leading zero nibbles of a raw digest; equals `leading_zero_chars` of its
/// hex encoding without allocating it.
pub fn leading_zero_nibbles(digest: &[u8; 32]) -> u32 {
    let mut total = 0u32;
    for b in digest {
        if *b == 0 {
            total += 2;
        } else {
            if *b < 0x10 {
                total += 1;
            }
            break;
        }
    }
    total
}

pub fn meets_difficulty(hex: &str, difficulty: u32) -> bool {
    leading_zero_chars(hex) >= difficulty
}
