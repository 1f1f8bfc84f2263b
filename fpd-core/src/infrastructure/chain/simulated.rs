//! An in-process consumer chain implementing the finality protocol rules:
//! registration, public randomness ledger, EOTS verification of every vote,
//! duplicate discrimination and secret-key extraction on conflicting votes.
//!
//! Backs the devnet network mode of the daemon and the integration harness.

use crate::domain::randomness::finality_sig_message;
use crate::domain::{BlockInfo, ProofOfPossession};
use crate::eots;
use crate::foundation::{
    BabylonPublicKey, BlockHash, BtcPublicKey, EotsSignature, ProviderError, PubRandValue, Result,
    TxResponse,
};
use crate::infrastructure::chain::{ClientController, FinalitySigEntry};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug)]
struct RegisteredProvider {
    #[allow(dead_code)]
    babylon_pk: BabylonPublicKey,
    #[allow(dead_code)]
    commission: String,
}

#[derive(Clone, Debug)]
struct VoteEntry {
    app_hash: BlockHash,
    signature: EotsSignature,
}

/// One accepted public randomness commitment, for harness assertions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitRecord {
    pub btc_pk: BtcPublicKey,
    pub start_height: u64,
    pub num_pub_rand: u64,
}

enum VoteOutcome {
    Accepted,
    DuplicateSameHash,
}

struct SimInner {
    activated_height: u64,
    best_height: u64,
    finalized_height: u64,
    registered: HashMap<BtcPublicKey, RegisteredProvider>,
    power: HashMap<BtcPublicKey, Vec<(u64, u64)>>,
    pub_rand: HashMap<BtcPublicKey, BTreeMap<u64, PubRandValue>>,
    commit_log: Vec<CommitRecord>,
    votes: HashMap<BtcPublicKey, BTreeMap<u64, VoteEntry>>,
    extracted: HashMap<BtcPublicKey, Vec<u8>>,
    static_tx_hash: Option<String>,
    tx_counter: u64,
}

pub struct SimulatedChain {
    inner: Mutex<SimInner>,
}

impl SimulatedChain {
    pub fn new(activated_height: u64) -> Self {
        Self {
            inner: Mutex::new(SimInner {
                activated_height,
                best_height: activated_height,
                finalized_height: 0,
                registered: HashMap::new(),
                power: HashMap::new(),
                pub_rand: HashMap::new(),
                commit_log: Vec::new(),
                votes: HashMap::new(),
                extracted: HashMap::new(),
                static_tx_hash: None,
                tx_counter: 0,
            }),
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, SimInner>> {
        self.inner.lock().map_err(|_| ProviderError::RpcError("simulated chain lock poisoned".to_string()))
    }

    fn block_hash(height: u64) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update(b"fpd-sim-block");
        hasher.update(height.to_be_bytes());
        BlockHash::new(hasher.finalize().into())
    }

    fn block_info(inner: &SimInner, height: u64) -> BlockInfo {
        BlockInfo::new(height, Self::block_hash(height), height <= inner.finalized_height)
    }

    fn power_at(inner: &SimInner, btc_pk: &BtcPublicKey, height: u64) -> u64 {
        inner
            .power
            .get(btc_pk)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(from, _)| *from <= height)
                    .map(|(_, power)| *power)
                    .last()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn next_tx(inner: &mut SimInner) -> TxResponse {
        if let Some(tx_hash) = &inner.static_tx_hash {
            return TxResponse::new(tx_hash.clone());
        }
        inner.tx_counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(b"fpd-sim-tx");
        hasher.update(inner.tx_counter.to_be_bytes());
        TxResponse::new(hex::encode(hasher.finalize()))
    }

    fn apply_vote(
        inner: &mut SimInner,
        btc_pk: &BtcPublicKey,
        block: &BlockInfo,
        pub_rand: &PubRandValue,
        signature: &EotsSignature,
    ) -> Result<VoteOutcome> {
        if !inner.registered.contains_key(btc_pk) {
            return Err(ProviderError::UnknownProvider(btc_pk.to_string()));
        }
        if Self::power_at(inner, btc_pk, block.height) == 0 {
            return Err(ProviderError::NotActive(btc_pk.to_string()));
        }
        let committed = inner
            .pub_rand
            .get(btc_pk)
            .and_then(|ledger| ledger.get(&block.height))
            .copied()
            .ok_or_else(|| ProviderError::permanent("missing-pub-rand", format!("height {}", block.height)))?;
        if committed != *pub_rand {
            return Err(ProviderError::permanent("pub-rand-mismatch", format!("height {}", block.height)));
        }

        let msg = finality_sig_message(block.height, &block.hash);
        if let Some(previous) = inner.votes.get(btc_pk).and_then(|votes| votes.get(&block.height)).cloned() {
            if previous.app_hash == block.hash {
                return Ok(VoteOutcome::DuplicateSameHash);
            }
            // Two valid signatures under the same randomness: extract the key.
            let pk = eots::PublicKey::from_bytes(btc_pk.as_bytes())?;
            let pub_rand_point = eots::pub_rand_from_bytes(committed.as_bytes())?;
            let prev_msg = finality_sig_message(block.height, &previous.app_hash);
            let prev_sig = eots::sig_from_bytes(previous.signature.as_bytes())?;
            let new_sig = eots::sig_from_bytes(signature.as_bytes())?;
            if !pk.verify(&pub_rand_point, &msg, &new_sig)? {
                return Err(ProviderError::permanent("invalid-finality-sig", format!("height {}", block.height)));
            }
            let extracted = eots::extract(&pk, &pub_rand_point, &prev_msg, &prev_sig, &msg, &new_sig)?;
            inner.extracted.insert(*btc_pk, extracted.to_bytes().to_vec());
            return Err(ProviderError::DuplicateVoteDiffHash { height: block.height });
        }

        let pk = eots::PublicKey::from_bytes(btc_pk.as_bytes())?;
        let pub_rand_point = eots::pub_rand_from_bytes(committed.as_bytes())?;
        let sig = eots::sig_from_bytes(signature.as_bytes())?;
        if !pk.verify(&pub_rand_point, &msg, &sig)? {
            return Err(ProviderError::permanent("invalid-finality-sig", format!("height {}", block.height)));
        }

        inner
            .votes
            .entry(*btc_pk)
            .or_default()
            .insert(block.height, VoteEntry { app_hash: block.hash, signature: *signature });
        Ok(VoteOutcome::Accepted)
    }

    // --- control surface used by the devnet producer and the harness ---

    pub fn advance_block(&self) -> Result<u64> {
        let mut inner = self.lock_inner()?;
        inner.best_height += 1;
        Ok(inner.best_height)
    }

    pub fn advance_to_height(&self, height: u64) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.best_height = inner.best_height.max(height);
        Ok(())
    }

    pub fn set_finalized_height(&self, height: u64) -> Result<()> {
        let mut inner = self.lock_inner()?;
        inner.finalized_height = height.min(inner.best_height);
        Ok(())
    }

    pub fn set_voting_power(&self, btc_pk: &BtcPublicKey, from_height: u64, power: u64) -> Result<()> {
        let mut inner = self.lock_inner()?;
        let entries = inner.power.entry(*btc_pk).or_default();
        entries.push((from_height, power));
        entries.sort_by_key(|(from, _)| *from);
        Ok(())
    }

    pub fn set_static_tx_hash(&self, tx_hash: Option<String>) -> Result<()> {
        self.lock_inner()?.static_tx_hash = tx_hash;
        Ok(())
    }

    pub fn block_at_height(&self, height: u64) -> Result<BlockInfo> {
        let inner = self.lock_inner()?;
        Ok(Self::block_info(&inner, height))
    }

    pub fn votes_of(&self, btc_pk: &BtcPublicKey) -> Result<Vec<(u64, BlockHash)>> {
        let inner = self.lock_inner()?;
        Ok(inner
            .votes
            .get(btc_pk)
            .map(|votes| votes.iter().map(|(height, entry)| (*height, entry.app_hash)).collect())
            .unwrap_or_default())
    }

    pub fn commit_log(&self) -> Result<Vec<CommitRecord>> {
        Ok(self.lock_inner()?.commit_log.clone())
    }

    pub fn extracted_key(&self, btc_pk: &BtcPublicKey) -> Result<Option<Vec<u8>>> {
        Ok(self.lock_inner()?.extracted.get(btc_pk).cloned())
    }
}

#[async_trait]
impl ClientController for SimulatedChain {
    async fn query_best_block(&self) -> Result<BlockInfo> {
        let inner = self.lock_inner()?;
        Ok(Self::block_info(&inner, inner.best_height))
    }

    async fn query_block(&self, height: u64) -> Result<BlockInfo> {
        let inner = self.lock_inner()?;
        if height > inner.best_height {
            return Err(ProviderError::transient("query_block", format!("height {} not yet produced", height)));
        }
        Ok(Self::block_info(&inner, height))
    }

    async fn query_activated_height(&self) -> Result<u64> {
        Ok(self.lock_inner()?.activated_height)
    }

    async fn query_latest_finalized_blocks(&self, limit: u64) -> Result<Vec<BlockInfo>> {
        let inner = self.lock_inner()?;
        let mut blocks = Vec::new();
        let mut height = inner.finalized_height;
        while height > 0 && (blocks.len() as u64) < limit {
            blocks.push(Self::block_info(&inner, height));
            height -= 1;
        }
        Ok(blocks)
    }

    async fn query_voting_power(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<u64> {
        let inner = self.lock_inner()?;
        Ok(Self::power_at(&inner, btc_pk, height))
    }

    async fn query_last_committed_pub_rand(
        &self,
        btc_pk: &BtcPublicKey,
        count: u64,
    ) -> Result<BTreeMap<u64, PubRandValue>> {
        let inner = self.lock_inner()?;
        Ok(inner
            .pub_rand
            .get(btc_pk)
            .map(|ledger| {
                ledger
                    .iter()
                    .rev()
                    .take(count as usize)
                    .map(|(height, value)| (*height, *value))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn register_finality_provider(
        &self,
        babylon_pk: &BabylonPublicKey,
        btc_pk: &BtcPublicKey,
        pop: &ProofOfPossession,
        commission: &str,
        _description: &str,
    ) -> Result<TxResponse> {
        let mut inner = self.lock_inner()?;
        if inner.registered.contains_key(btc_pk) {
            return Err(ProviderError::AlreadyExists(btc_pk.to_string()));
        }
        if pop.babylon_sig.is_empty() || pop.btc_sig.is_empty() {
            return Err(ProviderError::permanent("invalid-pop", "empty proof of possession"));
        }
        inner.registered.insert(
            *btc_pk,
            RegisteredProvider { babylon_pk: *babylon_pk, commission: commission.to_string() },
        );
        Ok(Self::next_tx(&mut inner))
    }

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &BtcPublicKey,
        start_height: u64,
        pub_rand_list: &[PubRandValue],
        signature: &[u8],
    ) -> Result<TxResponse> {
        let mut inner = self.lock_inner()?;
        if !inner.registered.contains_key(btc_pk) {
            return Err(ProviderError::UnknownProvider(btc_pk.to_string()));
        }
        if signature.is_empty() || pub_rand_list.is_empty() {
            return Err(ProviderError::permanent("invalid-commit", "empty randomness commit"));
        }
        let ledger = inner.pub_rand.entry(*btc_pk).or_default();
        if let Some((tip, _)) = ledger.iter().next_back() {
            if start_height <= *tip {
                return Err(ProviderError::AlreadyCommitted { start_height });
            }
        }
        for (index, value) in pub_rand_list.iter().enumerate() {
            ledger.insert(start_height + index as u64, *value);
        }
        inner.commit_log.push(CommitRecord {
            btc_pk: *btc_pk,
            start_height,
            num_pub_rand: pub_rand_list.len() as u64,
        });
        Ok(Self::next_tx(&mut inner))
    }

    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPublicKey,
        block: &BlockInfo,
        pub_rand: &PubRandValue,
        signature: &EotsSignature,
    ) -> Result<TxResponse> {
        let mut inner = self.lock_inner()?;
        match Self::apply_vote(&mut inner, btc_pk, block, pub_rand, signature)? {
            VoteOutcome::Accepted => Ok(Self::next_tx(&mut inner)),
            VoteOutcome::DuplicateSameHash => Err(ProviderError::DuplicateVoteSameHash { height: block.height }),
        }
    }

    async fn submit_batch_finality_sigs(
        &self,
        btc_pk: &BtcPublicKey,
        entries: &[FinalitySigEntry],
    ) -> Result<TxResponse> {
        let mut inner = self.lock_inner()?;
        for entry in entries {
            match Self::apply_vote(&mut inner, btc_pk, &entry.block, &entry.pub_rand, &entry.signature) {
                Ok(VoteOutcome::Accepted) | Ok(VoteOutcome::DuplicateSameHash) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Self::next_tx(&mut inner))
    }

    async fn query_finality_provider_slashed(&self, btc_pk: &BtcPublicKey) -> Result<Option<Vec<u8>>> {
        Ok(self.lock_inner()?.extracted.get(btc_pk).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_deterministic_and_total_ordered() {
        let chain = SimulatedChain::new(1);
        chain.advance_to_height(5).unwrap();
        let b3 = chain.block_at_height(3).unwrap();
        let b3_again = chain.block_at_height(3).unwrap();
        assert_eq!(b3, b3_again);
        assert_ne!(b3.hash, chain.block_at_height(4).unwrap().hash);
    }

    #[tokio::test]
    async fn finalized_blocks_are_returned_newest_first() {
        let chain = SimulatedChain::new(1);
        chain.advance_to_height(10).unwrap();
        chain.set_finalized_height(7).unwrap();
        let blocks = chain.query_latest_finalized_blocks(3).await.unwrap();
        let heights: Vec<u64> = blocks.iter().map(|block| block.height).collect();
        assert_eq!(heights, vec![7, 6, 5]);
        assert!(blocks.iter().all(|block| block.finalized));
    }

    #[tokio::test]
    async fn voting_power_follows_the_latest_entry() {
        let chain = SimulatedChain::new(1);
        let pk = BtcPublicKey::new([9u8; 32]);
        chain.set_voting_power(&pk, 5, 100).unwrap();
        chain.set_voting_power(&pk, 8, 0).unwrap();
        assert_eq!(chain.query_voting_power(&pk, 4).await.unwrap(), 0);
        assert_eq!(chain.query_voting_power(&pk, 5).await.unwrap(), 100);
        assert_eq!(chain.query_voting_power(&pk, 9).await.unwrap(), 0);
    }
}
