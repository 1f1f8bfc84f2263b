use crate::application::instance::FinalityProviderInstance;
use crate::config::AppConfig;
use crate::domain::{ProofOfPossession, ProviderRecord, ProviderStatus};
use crate::foundation::{BtcPublicKey, ChainId, KeyName, ProviderError, Result, TxResponse};
use crate::infrastructure::chain::ClientController;
use crate::infrastructure::signer::EotsManager;
use crate::infrastructure::storage::ProviderStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SLASHED_CHANNEL_CAPACITY: usize = 16;

/// Supervisor owning the provider store and the set of running instances.
pub struct FinalityProviderApp {
    store: Arc<dyn ProviderStore>,
    client: Arc<dyn ClientController>,
    signer: Arc<dyn EotsManager>,
    config: AppConfig,
    instances: Mutex<HashMap<BtcPublicKey, Arc<FinalityProviderInstance>>>,
    slashed_tx: mpsc::Sender<BtcPublicKey>,
    slashed_rx: Mutex<Option<mpsc::Receiver<BtcPublicKey>>>,
    drain_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FinalityProviderApp {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        client: Arc<dyn ClientController>,
        signer: Arc<dyn EotsManager>,
        config: AppConfig,
    ) -> Self {
        let (slashed_tx, slashed_rx) = mpsc::channel(SLASHED_CHANNEL_CAPACITY);
        Self {
            store,
            client,
            signer,
            config,
            instances: Mutex::new(HashMap::new()),
            slashed_tx,
            slashed_rx: Mutex::new(Some(slashed_rx)),
            drain_handle: Mutex::new(None),
        }
    }

    pub fn store(&self) -> Arc<dyn ProviderStore> {
        self.store.clone()
    }

    fn lock_instances(&self) -> Result<MutexGuard<'_, HashMap<BtcPublicKey, Arc<FinalityProviderInstance>>>> {
        self.instances
            .lock()
            .map_err(|_| ProviderError::Message("instance registry lock poisoned".to_string()))
    }

    /// Start the supervisor task draining slashing notifications.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut guard = self
            .slashed_rx
            .lock()
            .map_err(|_| ProviderError::Message("slashed channel lock poisoned".to_string()))?;
        let Some(mut rx) = guard.take() else {
            return Ok(());
        };
        let app = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(btc_pk) = rx.recv().await {
                let Some(app) = app.upgrade() else {
                    break;
                };
                warn!(btc_pk = %btc_pk, "slashing notification received, stopping instance");
                if let Err(err) = app.stop_instance(&btc_pk).await {
                    warn!(btc_pk = %btc_pk, error = %err, "failed to stop slashed instance");
                }
            }
        });
        let mut drain = self
            .drain_handle
            .lock()
            .map_err(|_| ProviderError::Message("drain handle lock poisoned".to_string()))?;
        *drain = Some(handle);
        info!("finality provider app started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let instances: Vec<Arc<FinalityProviderInstance>> =
            self.lock_instances()?.values().cloned().collect();
        for instance in instances {
            instance.stop().await?;
        }
        self.lock_instances()?.clear();
        if let Ok(mut drain) = self.drain_handle.lock() {
            if let Some(handle) = drain.take() {
                handle.abort();
            }
        }
        info!("finality provider app stopped");
        Ok(())
    }

    /// Create a new provider: fresh keys, proof of possession, a CREATED
    /// record in the store.
    pub async fn create_finality_provider(
        &self,
        key_name: &KeyName,
        chain_id: &ChainId,
        description: &str,
        commission: &str,
        hd_path: &str,
        passphrase: &str,
    ) -> Result<ProviderRecord> {
        let (babylon_pk, btc_pk) = self.signer.create_key(key_name, hd_path, passphrase).await?;

        let babylon_sig = self.signer.sign_babylon(&btc_pk, btc_pk.as_bytes()).await?;
        let btc_sig = self.signer.sign_btc(&btc_pk, &babylon_sig).await?;
        let pop = ProofOfPossession { babylon_sig, btc_sig };

        let record = ProviderRecord::new(
            babylon_pk,
            btc_pk,
            key_name.clone(),
            chain_id.clone(),
            description.to_string(),
            commission.to_string(),
            pop,
        );
        self.store.put_provider(record.clone())?;
        info!(btc_pk = %btc_pk, key_name = %key_name, chain_id = %chain_id, "finality provider created");
        Ok(record)
    }

    /// Submit the on-chain registration and transition CREATED -> REGISTERED.
    pub async fn register_finality_provider(&self, btc_pk: &BtcPublicKey) -> Result<TxResponse> {
        let record = self.must_get_provider(btc_pk)?;
        if record.status != ProviderStatus::Created {
            return Err(ProviderError::InvalidStateTransition {
                from: record.status.to_string(),
                to: ProviderStatus::Registered.to_string(),
            });
        }

        let tx = self
            .client
            .register_finality_provider(
                &record.babylon_pk,
                &record.btc_pk,
                &record.pop,
                &record.commission,
                &record.description,
            )
            .await?;
        self.store.set_status(btc_pk, ProviderStatus::Registered)?;
        info!(btc_pk = %btc_pk, tx_hash = %tx.tx_hash, "finality provider registered");
        Ok(tx)
    }

    /// Construct and start the instance for a non-SLASHED record.
    pub async fn start_handling_finality_provider(self: &Arc<Self>, btc_pk: &BtcPublicKey) -> Result<()> {
        let record = self.must_get_provider(btc_pk)?;
        if record.status == ProviderStatus::Slashed {
            return Err(ProviderError::Slashed(btc_pk.to_string()));
        }

        let instance = {
            let mut instances = self.lock_instances()?;
            if let Some(existing) = instances.get(btc_pk) {
                existing.clone()
            } else {
                let instance = Arc::new(FinalityProviderInstance::new(
                    record,
                    self.store.clone(),
                    self.client.clone(),
                    self.signer.clone(),
                    self.config.clone(),
                    self.slashed_tx.clone(),
                ));
                instances.insert(*btc_pk, instance.clone());
                instance
            }
        };
        instance.start().await
    }

    /// Start instances for every stored provider except SLASHED ones.
    pub async fn start_handling_all(self: &Arc<Self>) -> Result<()> {
        for record in self.store.list_providers()? {
            if record.status == ProviderStatus::Slashed {
                debug!(btc_pk = %record.btc_pk, "skipping slashed provider");
                continue;
            }
            self.start_handling_finality_provider(&record.btc_pk).await?;
        }
        Ok(())
    }

    pub async fn stop_instance(&self, btc_pk: &BtcPublicKey) -> Result<()> {
        let instance = self.lock_instances()?.remove(btc_pk);
        if let Some(instance) = instance {
            instance.stop().await?;
        }
        Ok(())
    }

    pub fn get_finality_provider_instance(
        &self,
        btc_pk: &BtcPublicKey,
    ) -> Result<Arc<FinalityProviderInstance>> {
        self.lock_instances()?
            .get(btc_pk)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(btc_pk.to_string()))
    }

    /// Currently running instances; slashed providers never appear here.
    pub fn list_finality_provider_instances(&self) -> Vec<BtcPublicKey> {
        self.lock_instances()
            .map(|instances| {
                instances
                    .values()
                    .filter(|instance| instance.is_running())
                    .map(|instance| instance.btc_pk())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_finality_provider(&self, btc_pk: &BtcPublicKey) -> Result<ProviderRecord> {
        self.must_get_provider(btc_pk)
    }

    pub fn query_finality_provider_list(&self) -> Result<Vec<ProviderRecord>> {
        self.store.list_providers()
    }

    fn must_get_provider(&self, btc_pk: &BtcPublicKey) -> Result<ProviderRecord> {
        self.store
            .get_provider(btc_pk)?
            .ok_or_else(|| ProviderError::NotFound(btc_pk.to_string()))
    }
}
