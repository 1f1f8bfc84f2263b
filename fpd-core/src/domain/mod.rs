pub mod block;
pub mod provider;
pub mod randomness;

pub use block::BlockInfo;
pub use provider::{ProofOfPossession, ProviderRecord, ProviderStatus};
pub use randomness::{commit_message_hash, finality_sig_message, PubRandCommit};
