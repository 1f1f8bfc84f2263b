use crate::config::RandomnessConfig;
use crate::domain::randomness::commit_message_hash;
use crate::foundation::{BtcPublicKey, ChainId, ProviderError, Result, TxResponse};
use crate::infrastructure::chain::ClientController;
use crate::infrastructure::signer::EotsManager;
use std::sync::Arc;
use tracing::{debug, info};

/// Decides when to commit the next batch of public randomness and how far
/// ahead, and performs the commit through the signer and the chain client.
#[derive(Clone)]
pub struct RandomnessScheduler {
    client: Arc<dyn ClientController>,
    signer: Arc<dyn EotsManager>,
    config: RandomnessConfig,
}

impl RandomnessScheduler {
    pub fn new(client: Arc<dyn ClientController>, signer: Arc<dyn EotsManager>, config: RandomnessConfig) -> Self {
        Self { client, signer, config }
    }

    /// Highest height with committed randomness acknowledged by the chain.
    pub async fn last_committed_height(&self, btc_pk: &BtcPublicKey) -> Result<Option<u64>> {
        let committed = self.client.query_last_committed_pub_rand(btc_pk, 1).await?;
        Ok(committed.keys().next_back().copied())
    }

    /// Whether the committed tip leaves less than `min_rand_height_gap`
    /// headroom above `height`.
    pub fn needs_commit(tip: Option<u64>, height: u64, min_gap: u64) -> bool {
        match tip {
            None => true,
            Some(tip) => tip.saturating_sub(height) < min_gap,
        }
    }

    /// Whether randomness covering `height` has been acknowledged.
    pub async fn covers(&self, btc_pk: &BtcPublicKey, height: u64) -> Result<bool> {
        Ok(self.last_committed_height(btc_pk).await?.is_some_and(|tip| tip >= height))
    }

    /// Commit a batch of `num` pub rand values starting at `start_height`.
    /// A chain-side "already committed" rejection is treated as success.
    pub async fn commit(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        start_height: u64,
        num: u32,
    ) -> Result<Option<TxResponse>> {
        let pub_rands = self
            .signer
            .create_randomness_pair_list(btc_pk, chain_id, start_height, num)
            .await?;
        let msg = commit_message_hash(chain_id, start_height, &pub_rands);
        let signature = self.signer.sign_btc(btc_pk, &msg).await?;

        match self.client.commit_pub_rand_list(btc_pk, start_height, &pub_rands, &signature).await {
            Ok(tx) => {
                info!(
                    btc_pk = %btc_pk,
                    start_height,
                    num,
                    tx_hash = %tx.tx_hash,
                    "committed public randomness"
                );
                Ok(Some(tx))
            }
            Err(ProviderError::AlreadyCommitted { start_height }) => {
                debug!(btc_pk = %btc_pk, start_height, "randomness already committed");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Commit a fresh batch if the committed tip runs too close to
    /// `current_height`. Returns the new committed tip.
    pub async fn commit_if_needed(
        &self,
        btc_pk: &BtcPublicKey,
        chain_id: &ChainId,
        current_height: u64,
    ) -> Result<Option<u64>> {
        let tip = self.last_committed_height(btc_pk).await?;
        if !Self::needs_commit(tip, current_height, self.config.min_rand_height_gap) {
            return Ok(tip);
        }
        let start_height = match tip {
            Some(tip) => tip + 1,
            None => current_height.max(1),
        };
        self.commit(btc_pk, chain_id, start_height, self.config.num_pub_rand).await?;
        self.last_committed_height(btc_pk).await
    }

    pub fn config(&self) -> &RandomnessConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_when_no_randomness_exists() {
        assert!(RandomnessScheduler::needs_commit(None, 1, 10));
    }

    #[test]
    fn commits_when_headroom_shrinks_below_gap() {
        assert!(RandomnessScheduler::needs_commit(Some(14), 5, 10));
        assert!(!RandomnessScheduler::needs_commit(Some(15), 5, 10));
        assert!(!RandomnessScheduler::needs_commit(Some(100), 5, 10));
    }

    #[test]
    fn commits_when_tip_is_behind_current_height() {
        assert!(RandomnessScheduler::needs_commit(Some(3), 5, 10));
    }
}
