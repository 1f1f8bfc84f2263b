pub mod simulated;

pub use simulated::SimulatedChain;

use crate::domain::{BlockInfo, ProofOfPossession};
use crate::foundation::{BabylonPublicKey, BtcPublicKey, EotsSignature, PubRandValue, Result, TxResponse};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One entry of a batched finality submission, in ascending height order.
#[derive(Clone, Debug)]
pub struct FinalitySigEntry {
    pub block: BlockInfo,
    pub pub_rand: PubRandValue,
    pub signature: EotsSignature,
}

/// Client of the consumer chain. Implementations map transport failures to
/// `Transient` and protocol rejections to the dedicated error variants, in
/// particular distinguishing `DuplicateVoteSameHash` from
/// `DuplicateVoteDiffHash`.
#[async_trait]
pub trait ClientController: Send + Sync {
    async fn query_best_block(&self) -> Result<BlockInfo>;

    async fn query_block(&self, height: u64) -> Result<BlockInfo>;

    /// First height at which finality providers are active on this chain.
    async fn query_activated_height(&self) -> Result<u64>;

    /// Latest finalized blocks, newest first.
    async fn query_latest_finalized_blocks(&self, limit: u64) -> Result<Vec<BlockInfo>>;

    async fn query_voting_power(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<u64>;

    /// The most recent `count` committed public randomness values, by height.
    async fn query_last_committed_pub_rand(
        &self,
        btc_pk: &BtcPublicKey,
        count: u64,
    ) -> Result<BTreeMap<u64, PubRandValue>>;

    async fn register_finality_provider(
        &self,
        babylon_pk: &BabylonPublicKey,
        btc_pk: &BtcPublicKey,
        pop: &ProofOfPossession,
        commission: &str,
        description: &str,
    ) -> Result<TxResponse>;

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &BtcPublicKey,
        start_height: u64,
        pub_rand_list: &[PubRandValue],
        signature: &[u8],
    ) -> Result<TxResponse>;

    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPublicKey,
        block: &BlockInfo,
        pub_rand: &PubRandValue,
        signature: &EotsSignature,
    ) -> Result<TxResponse>;

    /// Batched submission; the chain accepts a prefix, skipping entries that
    /// duplicate an identical earlier vote.
    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &BtcPublicKey,
        entries: &[FinalitySigEntry],
    ) -> Result<TxResponse>;

    /// The extracted secret key, if this provider has been slashed on-chain.
    async fn query_finality_provider_slashed(&self, btc_pk: &BtcPublicKey) -> Result<Option<Vec<u8>>>;
}
