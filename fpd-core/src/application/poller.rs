use crate::config::PollerConfig;
use crate::domain::BlockInfo;
use crate::foundation::Result;
use crate::infrastructure::chain::ClientController;
use crate::infrastructure::retry::{retry_with_backoff, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Single-consumer sequence of blocks in strictly ascending height order.
///
/// The producer polls the chain once per interval and enqueues every height
/// in `[next_height, best]`. The queue is bounded; a stalled consumer
/// backpressures the producer but blocks are never dropped or skipped.
pub struct ChainPoller {
    rx: mpsc::Receiver<BlockInfo>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ChainPoller {
    /// Resolve the poller start height per configuration.
    pub async fn resolve_start_height(
        client: &Arc<dyn ClientController>,
        config: &PollerConfig,
    ) -> Result<u64> {
        if config.auto_chain_scanning_mode {
            client.query_activated_height().await
        } else {
            Ok(config.static_chain_scanning_start_height)
        }
    }

    pub fn start(
        client: Arc<dyn ClientController>,
        config: PollerConfig,
        start_height: u64,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(produce_blocks(client, config, start_height, retry, tx, shutdown_rx));
        Self { rx, shutdown, handle }
    }

    /// Next block, or `None` once the poller has shut down.
    pub async fn next_block(&mut self) -> Option<BlockInfo> {
        self.rx.recv().await
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        drop(self.rx);
        let _ = self.handle.await;
    }
}

async fn produce_blocks(
    client: Arc<dyn ClientController>,
    config: PollerConfig,
    start_height: u64,
    retry: RetryPolicy,
    tx: mpsc::Sender<BlockInfo>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut next_height = start_height;
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(start_height, "block poller started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tx.closed() => break,
            _ = ticker.tick() => {}
        }

        let best = match retry_with_backoff(&retry, "query_best_block", || client.query_best_block()).await {
            Ok(block) => block.height,
            Err(err) => {
                warn!(error = %err, "failed to query best block");
                continue;
            }
        };

        while next_height <= best {
            let block = match retry_with_backoff(&retry, "query_block", || client.query_block(next_height)).await {
                Ok(block) => block,
                Err(err) => {
                    warn!(height = next_height, error = %err, "failed to query block");
                    break;
                }
            };
            debug!(height = block.height, finalized = block.finalized, "polled block");
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                result = tx.send(block) => {
                    if result.is_err() {
                        return;
                    }
                }
            }
            next_height += 1;
        }
    }
    info!(next_height, "block poller stopped");
}
