use fpd_core::config::DevnetConfig;
use fpd_core::infrastructure::chain::SimulatedChain;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Drive the in-process devnet chain: produce one block per `block_time_ms`
/// and trail the finalized tip `finality_lag` blocks behind the best one.
pub fn spawn_devnet_producer(
    chain: Arc<SimulatedChain>,
    config: DevnetConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(config.block_time_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            match chain.advance_block() {
                Ok(best) => {
                    let finalized = best.saturating_sub(config.finality_lag);
                    if let Err(err) = chain.set_finalized_height(finalized) {
                        warn!(error = %err, "failed to advance finalized height");
                    }
                    debug!(best, finalized, "devnet block produced");
                }
                Err(err) => warn!(error = %err, "failed to produce devnet block"),
            }
        }
    })
}
