use crate::application::instance::InstanceContext;
use crate::domain::ProviderStatus;
use crate::foundation::{BtcPublicKey, Result};
use crate::infrastructure::chain::ClientController;
use crate::infrastructure::signer::EotsManager;
use crate::infrastructure::storage::ProviderStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Watches the chain for an extracted secret key against our BTC public key
/// and drives the terminal SLASHED transition.
pub struct EquivocationDetector;

impl EquivocationDetector {
    /// One detection pass. When the chain holds an extracted key that
    /// matches the local secret (up to secp256k1 sign), the SLASHED status
    /// is persisted and the extracted key returned in hex.
    pub async fn check_once(
        client: &Arc<dyn ClientController>,
        signer: &Arc<dyn EotsManager>,
        store: &Arc<dyn ProviderStore>,
        btc_pk: &BtcPublicKey,
    ) -> Result<Option<String>> {
        let Some(extracted) = client.query_finality_provider_slashed(btc_pk).await? else {
            return Ok(None);
        };
        if !signer.local_key_matches(btc_pk, &extracted).await? {
            error!(btc_pk = %btc_pk, "chain reports an extracted key that does not match the local key");
            return Ok(None);
        }
        store.set_status(btc_pk, ProviderStatus::Slashed)?;
        warn!(btc_pk = %btc_pk, "secret key extracted on chain, provider slashed");
        Ok(Some(hex::encode(extracted)))
    }

    /// Periodic monitor task attached to a running instance. On confirmed
    /// slashing it updates the instance cache, signals the supervisor over
    /// the bounded channel and exits.
    pub(crate) fn spawn_monitor(
        ctx: Arc<InstanceContext>,
        interval_ms: u64,
        mut shutdown_rx: watch::Receiver<bool>,
        slashed_tx: mpsc::Sender<BtcPublicKey>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                match Self::check_once(&ctx.client, &ctx.signer, &ctx.store, &ctx.btc_pk).await {
                    Ok(Some(_)) => {
                        ctx.update_cache(|record| record.status = ProviderStatus::Slashed);
                        let _ = slashed_tx.try_send(ctx.btc_pk);
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(btc_pk = %ctx.btc_pk, error = %err, "slashing check failed");
                    }
                }
            }
        })
    }
}
