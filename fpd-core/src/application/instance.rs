use crate::application::fast_sync::{self, FastSyncResult};
use crate::application::poller::ChainPoller;
use crate::application::randomness::RandomnessScheduler;
use crate::application::slashing::EquivocationDetector;
use crate::config::AppConfig;
use crate::domain::randomness::finality_sig_message;
use crate::domain::{BlockInfo, ProviderRecord, ProviderStatus};
use crate::foundation::{BtcPublicKey, ChainId, ProviderError, Result, TxResponse};
use crate::infrastructure::chain::ClientController;
use crate::infrastructure::retry::{retry_with_backoff, RetryPolicy};
use crate::infrastructure::signer::EotsManager;
use crate::infrastructure::storage::ProviderStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Shared dependencies and cached record of one provider instance. The cache
/// mirrors the store; all writes go through the persist helpers so the two
/// never diverge.
pub(crate) struct InstanceContext {
    pub(crate) btc_pk: BtcPublicKey,
    pub(crate) chain_id: ChainId,
    pub(crate) store: Arc<dyn ProviderStore>,
    pub(crate) client: Arc<dyn ClientController>,
    pub(crate) signer: Arc<dyn EotsManager>,
    pub(crate) scheduler: RandomnessScheduler,
    pub(crate) config: AppConfig,
    record: RwLock<ProviderRecord>,
}

impl InstanceContext {
    pub(crate) fn cached_record(&self) -> ProviderRecord {
        self.record.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub(crate) fn update_cache(&self, f: impl FnOnce(&mut ProviderRecord)) {
        let mut record = self.record.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut record);
    }

    pub(crate) fn persist_status(&self, status: ProviderStatus) -> Result<()> {
        self.store.set_status(&self.btc_pk, status)?;
        self.update_cache(|record| record.status = status);
        Ok(())
    }

    pub(crate) fn persist_heights(&self, last_voted: u64, last_processed: u64) -> Result<()> {
        self.store.set_heights(&self.btc_pk, last_voted, last_processed)?;
        self.update_cache(|record| {
            record.last_voted_height = last_voted;
            record.last_processed_height = last_processed;
        });
        Ok(())
    }

    pub(crate) fn persist_processed(&self, height: u64) -> Result<()> {
        self.store.set_last_processed_height(&self.btc_pk, height)?;
        self.update_cache(|record| record.last_processed_height = height);
        Ok(())
    }

    pub(crate) fn submission_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.submission.max_submission_retries,
            Duration::from_millis(self.config.submission.submission_retry_interval_ms),
            Duration::from_secs(10),
        )
    }
}

struct InstanceCtl {
    shutdown: watch::Sender<bool>,
    loop_handle: JoinHandle<()>,
    monitor_handle: JoinHandle<()>,
}

/// The per-provider cooperative actor: consumes blocks from the poller,
/// keeps randomness committed ahead, casts finality votes, catches up via
/// fast sync, and exits on slashing.
pub struct FinalityProviderInstance {
    ctx: Arc<InstanceContext>,
    running: Arc<AtomicBool>,
    ctl: Mutex<Option<InstanceCtl>>,
    slashed_tx: mpsc::Sender<BtcPublicKey>,
}

impl FinalityProviderInstance {
    pub fn new(
        record: ProviderRecord,
        store: Arc<dyn ProviderStore>,
        client: Arc<dyn ClientController>,
        signer: Arc<dyn EotsManager>,
        config: AppConfig,
        slashed_tx: mpsc::Sender<BtcPublicKey>,
    ) -> Self {
        let scheduler = RandomnessScheduler::new(client.clone(), signer.clone(), config.randomness.clone());
        let ctx = Arc::new(InstanceContext {
            btc_pk: record.btc_pk,
            chain_id: record.chain_id.clone(),
            store,
            client,
            signer,
            scheduler,
            config,
            record: RwLock::new(record),
        });
        Self { ctx, running: Arc::new(AtomicBool::new(false)), ctl: Mutex::new(None), slashed_tx }
    }

    // --- accessors ---

    pub fn btc_pk(&self) -> BtcPublicKey {
        self.ctx.btc_pk
    }

    pub fn chain_id(&self) -> ChainId {
        self.ctx.chain_id.clone()
    }

    pub fn status(&self) -> ProviderStatus {
        self.ctx.cached_record().status
    }

    pub fn last_voted_height(&self) -> u64 {
        self.ctx.cached_record().last_voted_height
    }

    pub fn last_processed_height(&self) -> u64 {
        self.ctx.cached_record().last_processed_height
    }

    pub fn store_record(&self) -> ProviderRecord {
        self.ctx.cached_record()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // --- lifecycle ---

    /// Idempotent; a second call while running is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let record = self.ctx.cached_record();
        if record.status == ProviderStatus::Slashed {
            self.running.store(false, Ordering::SeqCst);
            return Err(ProviderError::Slashed(self.ctx.btc_pk.to_string()));
        }

        let configured_start =
            match ChainPoller::resolve_start_height(&self.ctx.client, &self.ctx.config.poller).await {
                Ok(height) => height,
                Err(err) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(err);
                }
            };
        let start_height = configured_start.max(record.last_processed_height + 1);
        let poller = ChainPoller::start(
            self.ctx.client.clone(),
            self.ctx.config.poller.clone(),
            start_height,
            RetryPolicy::default(),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor_handle = EquivocationDetector::spawn_monitor(
            self.ctx.clone(),
            self.ctx.config.monitor.slashing_check_interval_ms,
            shutdown.subscribe(),
            self.slashed_tx.clone(),
        );
        let loop_handle = tokio::spawn(run_loop(self.clone(), poller, shutdown_rx));

        let mut ctl = self.ctl.lock().map_err(|_| ProviderError::Message("instance control lock poisoned".to_string()))?;
        *ctl = Some(InstanceCtl { shutdown, loop_handle, monitor_handle });
        info!(btc_pk = %self.ctx.btc_pk, start_height, "finality provider instance started");
        Ok(())
    }

    /// Idempotent; drains the in-flight block and exits the loop.
    pub async fn stop(&self) -> Result<()> {
        let ctl = {
            let mut guard = self
                .ctl
                .lock()
                .map_err(|_| ProviderError::Message("instance control lock poisoned".to_string()))?;
            guard.take()
        };
        let Some(ctl) = ctl else {
            return Ok(());
        };
        let _ = ctl.shutdown.send(true);
        let _ = ctl.loop_handle.await;
        let _ = ctl.monitor_handle.await;
        self.running.store(false, Ordering::SeqCst);
        info!(btc_pk = %self.ctx.btc_pk, "finality provider instance stopped");
        Ok(())
    }

    // --- operations ---

    /// Commit `num` pub rand values ahead of the current committed tip.
    pub async fn commit_pub_rand(&self, num: u32) -> Result<Option<TxResponse>> {
        let tip = self.ctx.scheduler.last_committed_height(&self.ctx.btc_pk).await?;
        let start_height = match tip {
            Some(tip) => tip + 1,
            None => (self.ctx.cached_record().last_processed_height + 1).max(1),
        };
        self.ctx.scheduler.commit(&self.ctx.btc_pk, &self.ctx.chain_id, start_height, num).await
    }

    /// Sign and submit a finality vote for an arbitrary block. Returns the
    /// extracted and local secret keys (hex) when the chain reports a
    /// conflicting earlier vote, after persisting the SLASHED transition.
    pub async fn submit_finality_signature(
        &self,
        block: &BlockInfo,
    ) -> Result<(TxResponse, Option<String>, Option<String>)> {
        let ctx = &self.ctx;
        let msg = finality_sig_message(block.height, &block.hash);
        let pub_rand = ctx
            .signer
            .create_randomness_pair_list(&ctx.btc_pk, &ctx.chain_id, block.height, 1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| ProviderError::RandomnessExhausted { height: block.height })?;
        let signature = ctx.signer.sign_eots(&ctx.btc_pk, &ctx.chain_id, block.height, &msg).await?;

        match ctx.client.submit_finality_sig(&ctx.btc_pk, block, &pub_rand, &signature).await {
            Ok(tx) => {
                let record = ctx.cached_record();
                if block.height > record.last_voted_height {
                    ctx.persist_heights(block.height, block.height.max(record.last_processed_height))?;
                }
                Ok((tx, None, None))
            }
            Err(ProviderError::DuplicateVoteSameHash { height }) => {
                debug!(height, "vote already on chain with the same hash");
                Ok((TxResponse::default(), None, None))
            }
            Err(ProviderError::DuplicateVoteDiffHash { height }) => {
                warn!(height, "conflicting vote submitted, secret key extracted on chain");
                let extracted = ctx
                    .client
                    .query_finality_provider_slashed(&ctx.btc_pk)
                    .await?
                    .ok_or_else(|| {
                        ProviderError::Message("conflicting vote reported but no extracted key on chain".to_string())
                    })?;
                if !ctx.signer.local_key_matches(&ctx.btc_pk, &extracted).await? {
                    return Err(ProviderError::crypto(
                        "slashing check",
                        "extracted key does not match the local key",
                    ));
                }
                ctx.persist_status(ProviderStatus::Slashed)?;
                let _ = self.slashed_tx.try_send(ctx.btc_pk);
                let local = ctx.signer.key_record(&ctx.btc_pk, "").await?;
                Ok((TxResponse::default(), Some(hex::encode(extracted)), Some(hex::encode(local))))
            }
            Err(err) => Err(err),
        }
    }

    // --- loop internals ---

    /// Keep the committed randomness ahead of the next height this instance
    /// will decide on. Anchoring at the cursor (not the chain tip) keeps the
    /// ledger contiguous over every height we may still vote for.
    async fn check_randomness(&self) -> Result<()> {
        let next_height = self.ctx.cached_record().last_processed_height + 1;
        self.ctx
            .scheduler
            .commit_if_needed(&self.ctx.btc_pk, &self.ctx.chain_id, next_height)
            .await?;
        Ok(())
    }

    async fn process_block(&self, block: &BlockInfo) -> Result<()> {
        let ctx = &self.ctx;
        let record = ctx.cached_record();

        // already decided for this height
        if block.height <= record.last_processed_height {
            debug!(height = block.height, "height already processed");
            return Ok(());
        }
        if record.status == ProviderStatus::Slashed {
            return Err(ProviderError::Slashed(ctx.btc_pk.to_string()));
        }

        if block.finalized {
            if let Some(result) = self.maybe_fast_sync(record.last_processed_height).await? {
                if block.height <= result.last_processed_height {
                    return Ok(());
                }
            }
        }

        let retry = ctx.submission_retry_policy();
        let power = retry_with_backoff(&retry, "query_voting_power", || {
            ctx.client.query_voting_power(&ctx.btc_pk, block.height)
        })
        .await?;

        if power == 0 {
            if record.status == ProviderStatus::Active {
                ctx.persist_status(ProviderStatus::Inactive)?;
            }
            ctx.persist_processed(block.height)?;
            debug!(height = block.height, "no voting power, height skipped");
            return Ok(());
        }
        if record.status != ProviderStatus::Active {
            ctx.persist_status(ProviderStatus::Active)?;
        }

        // never sign a height whose randomness is not acknowledged on-chain;
        // commit first and only vote once the chain acknowledged the batch
        if !ctx.scheduler.covers(&ctx.btc_pk, block.height).await? {
            ctx.scheduler.commit_if_needed(&ctx.btc_pk, &ctx.chain_id, block.height).await?;
            if !ctx.scheduler.covers(&ctx.btc_pk, block.height).await? {
                ctx.persist_processed(block.height)?;
                info!(height = block.height, "randomness commit pending, height skipped");
                return Ok(());
            }
        }

        match self.submit_vote_with_retry(block).await {
            Ok(tx) => {
                ctx.persist_heights(block.height, block.height)?;
                info!(height = block.height, tx_hash = %tx.tx_hash, "finality vote submitted");
                Ok(())
            }
            Err(ProviderError::DuplicateVoteSameHash { height }) => {
                debug!(height, "duplicate vote over the same hash, cursors advanced");
                ctx.persist_heights(block.height, block.height)?;
                Ok(())
            }
            Err(ProviderError::DuplicateVoteDiffHash { height }) => {
                self.handle_equivocation().await;
                Err(ProviderError::DuplicateVoteDiffHash { height })
            }
            Err(err) => Err(err),
        }
    }

    async fn maybe_fast_sync(&self, last_processed: u64) -> Result<Option<FastSyncResult>> {
        let ctx = &self.ctx;
        let finalized = ctx.client.query_latest_finalized_blocks(1).await?;
        let Some(tip) = finalized.first() else {
            return Ok(None);
        };
        if tip.height.saturating_sub(last_processed) <= ctx.config.fast_sync.fast_sync_gap {
            return Ok(None);
        }
        info!(
            last_processed,
            finalized_tip = tip.height,
            "behind the finalized tip, entering fast sync"
        );
        let result = fast_sync::run(ctx, tip.height).await?;
        Ok(Some(result))
    }

    async fn submit_vote_with_retry(&self, block: &BlockInfo) -> Result<TxResponse> {
        let ctx = &self.ctx;
        let msg = finality_sig_message(block.height, &block.hash);
        let pub_rand = ctx
            .signer
            .create_randomness_pair_list(&ctx.btc_pk, &ctx.chain_id, block.height, 1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| ProviderError::RandomnessExhausted { height: block.height })?;

        let signature = match ctx.signer.sign_eots(&ctx.btc_pk, &ctx.chain_id, block.height, &msg).await {
            Ok(signature) => signature,
            Err(ProviderError::RandomnessExhausted { .. }) => {
                ctx.scheduler.commit_if_needed(&ctx.btc_pk, &ctx.chain_id, block.height).await?;
                ctx.signer.sign_eots(&ctx.btc_pk, &ctx.chain_id, block.height, &msg).await?
            }
            Err(err) => return Err(err),
        };

        let retry = ctx.submission_retry_policy();
        retry_with_backoff(&retry, "submit_finality_sig", || {
            ctx.client.submit_finality_sig(&ctx.btc_pk, block, &pub_rand, &signature)
        })
        .await
    }

    async fn handle_equivocation(&self) {
        let ctx = &self.ctx;
        match EquivocationDetector::check_once(&ctx.client, &ctx.signer, &ctx.store, &ctx.btc_pk).await {
            Ok(Some(_)) => {
                ctx.update_cache(|record| record.status = ProviderStatus::Slashed);
                let _ = self.slashed_tx.try_send(ctx.btc_pk);
            }
            Ok(None) => {
                warn!(btc_pk = %ctx.btc_pk, "conflicting vote reported but no extraction on chain yet");
            }
            Err(err) => {
                warn!(btc_pk = %ctx.btc_pk, error = %err, "slashing check failed");
            }
        }
    }
}

async fn run_loop(
    instance: Arc<FinalityProviderInstance>,
    mut poller: ChainPoller,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let retry_after =
        Duration::from_millis(instance.ctx.config.submission.retry_after_failure_ms);
    let mut rand_ticker = tokio::time::interval(Duration::from_millis(
        instance.ctx.config.randomness.commit_check_interval_ms,
    ));
    rand_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut pending: Option<BlockInfo> = None;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Some(block) = pending.take() {
            match instance.process_block(&block).await {
                Ok(()) => {}
                Err(ProviderError::Cancelled) => break,
                Err(ProviderError::DuplicateVoteDiffHash { height }) => {
                    error!(height, "equivocation detected, shutting the instance down");
                    break;
                }
                Err(ProviderError::Slashed(_)) => break,
                Err(err) if err.is_transient() => {
                    warn!(
                        height = block.height,
                        error = %err,
                        pause_ms = retry_after.as_millis() as u64,
                        "block processing failed, pausing before retry"
                    );
                    pending = Some(block);
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = sleep(retry_after) => {}
                    }
                }
                Err(err) => {
                    error!(height = block.height, error = %err, "unrecoverable error, halting instance");
                    break;
                }
            }
            continue;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = rand_ticker.tick() => {
                if let Err(err) = instance.check_randomness().await {
                    warn!(error = %err, "randomness check failed");
                }
            }
            block = poller.next_block() => match block {
                Some(block) => pending = Some(block),
                None => break,
            }
        }
    }

    poller.stop().await;
    instance.running.store(false, Ordering::SeqCst);
    info!(btc_pk = %instance.ctx.btc_pk, "instance loop exited");
}
