use crate::foundation::BlockHash;
use serde::{Deserialize, Serialize};

/// A block of the consumer chain as seen by the poller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: BlockHash,
    pub finalized: bool,
}

impl BlockInfo {
    pub fn new(height: u64, hash: BlockHash, finalized: bool) -> Self {
        Self { height, hash, finalized }
    }
}
