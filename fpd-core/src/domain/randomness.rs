use crate::foundation::{BlockHash, ChainId, Hash32, PubRandValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A committed range of public randomness on the chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PubRandCommit {
    pub start_height: u64,
    pub num_pub_rand: u64,
}

impl PubRandCommit {
    pub fn in_range(&self, height: u64) -> bool {
        self.start_height <= height && height <= self.end_height()
    }

    pub fn end_height(&self) -> u64 {
        self.start_height + self.num_pub_rand - 1
    }
}

/// Message signed by the BTC key when committing a batch of public
/// randomness: SHA-256 over `chain_id || start_height || pub_rand list`.
pub fn commit_message_hash(chain_id: &ChainId, start_height: u64, pub_rands: &[PubRandValue]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.as_str().as_bytes());
    hasher.update(start_height.to_be_bytes());
    for pub_rand in pub_rands {
        hasher.update(pub_rand.as_bytes());
    }
    hasher.finalize().into()
}

/// Message an EOTS finality signature is produced over:
/// SHA-256 of `height || app_hash`.
pub fn finality_sig_message(height: u64, app_hash: &BlockHash) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(height.to_be_bytes());
    hasher.update(app_hash.as_bytes());
    hasher.finalize().into()
}
