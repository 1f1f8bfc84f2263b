use crate::application::instance::InstanceContext;
use crate::domain::randomness::finality_sig_message;
use crate::domain::ProviderStatus;
use crate::foundation::{ProviderError, Result, TxResponse};
use crate::infrastructure::chain::FinalitySigEntry;
use crate::infrastructure::retry::retry_with_backoff;
use tracing::{debug, info};

#[derive(Debug)]
pub(crate) struct FastSyncResult {
    pub tx: Option<TxResponse>,
    pub last_voted_height: u64,
    pub last_processed_height: u64,
}

/// Batch catch-up over `(last_processed, target_height]`.
///
/// Heights without voting power are counted as processed but not voted. The
/// chain accepts the batch prefix-monotonically and skips entries that
/// duplicate an identical earlier vote, so re-running over the same gap is
/// idempotent. A SLASHED transition observed mid-batch aborts the sync.
pub(crate) async fn run(ctx: &InstanceContext, target_height: u64) -> Result<FastSyncResult> {
    let record = ctx.cached_record();
    let last_processed = record.last_processed_height;
    if target_height <= last_processed {
        return Ok(FastSyncResult {
            tx: None,
            last_voted_height: record.last_voted_height,
            last_processed_height: last_processed,
        });
    }

    let retry = ctx.submission_retry_policy();
    let mut entries = Vec::new();

    for height in (last_processed + 1)..=target_height {
        let stored = ctx
            .store
            .get_provider(&ctx.btc_pk)?
            .ok_or_else(|| ProviderError::NotFound(ctx.btc_pk.to_string()))?;
        if stored.status == ProviderStatus::Slashed {
            return Err(ProviderError::Slashed(ctx.btc_pk.to_string()));
        }

        let block =
            retry_with_backoff(&retry, "query_block", || ctx.client.query_block(height)).await?;
        let power = retry_with_backoff(&retry, "query_voting_power", || {
            ctx.client.query_voting_power(&ctx.btc_pk, height)
        })
        .await?;
        if power == 0 {
            debug!(height, "no voting power during fast sync, height skipped");
            continue;
        }

        ensure_randomness_covers(ctx, height).await?;

        let pub_rand = ctx
            .signer
            .create_randomness_pair_list(&ctx.btc_pk, &ctx.chain_id, height, 1)
            .await?
            .first()
            .copied()
            .ok_or_else(|| ProviderError::RandomnessExhausted { height })?;
        let msg = finality_sig_message(height, &block.hash);
        let signature = ctx.signer.sign_eots(&ctx.btc_pk, &ctx.chain_id, height, &msg).await?;
        entries.push(FinalitySigEntry { block, pub_rand, signature });
    }

    if entries.is_empty() {
        ctx.persist_processed(target_height)?;
        let record = ctx.cached_record();
        return Ok(FastSyncResult {
            tx: None,
            last_voted_height: record.last_voted_height,
            last_processed_height: target_height,
        });
    }

    let tx = retry_with_backoff(&retry, "submit_batch_finality_sigs", || {
        ctx.client.submit_batch_finality_sigs(&ctx.btc_pk, &entries)
    })
    .await?;

    let last_voted_height = entries[entries.len() - 1].block.height;
    ctx.persist_heights(last_voted_height, target_height)?;
    info!(
        num_sigs = entries.len(),
        last_voted_height,
        last_processed_height = target_height,
        tx_hash = %tx.tx_hash,
        "fast sync batch submitted"
    );
    Ok(FastSyncResult {
        tx: Some(tx),
        last_voted_height,
        last_processed_height: target_height,
    })
}

async fn ensure_randomness_covers(ctx: &InstanceContext, height: u64) -> Result<()> {
    let mut tip = ctx.scheduler.last_committed_height(&ctx.btc_pk).await?;
    while tip.map_or(true, |tip| tip < height) {
        let start_height = tip.map_or(height.max(1), |tip| tip + 1);
        ctx.scheduler
            .commit(&ctx.btc_pk, &ctx.chain_id, start_height, ctx.scheduler.config().num_pub_rand)
            .await?;
        tip = ctx.scheduler.last_committed_height(&ctx.btc_pk).await?;
    }
    Ok(())
}
