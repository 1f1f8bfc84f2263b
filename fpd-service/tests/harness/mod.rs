#![allow(dead_code)]

pub mod wait;

use fpd_core::application::{FinalityProviderApp, FinalityProviderInstance, RandomnessScheduler};
use fpd_core::config::AppConfig;
use fpd_core::domain::ProviderRecord;
use fpd_core::foundation::{BtcPublicKey, ChainId, KeyName};
use fpd_core::infrastructure::chain::{ClientController, SimulatedChain};
use fpd_core::infrastructure::signer::{EotsManager, LocalEotsManager};
use fpd_core::infrastructure::storage::{MemoryProviderStore, ProviderStore};
use std::sync::Arc;

pub const TEST_CHAIN_ID: &str = "chain-test";
pub const TEST_PUB_RAND_NUM: u32 = 25;

/// One simulated chain, one local key store, one in-memory provider store
/// and the supervisor app wired together.
pub struct TestHarness {
    pub chain: Arc<SimulatedChain>,
    pub signer: Arc<LocalEotsManager>,
    pub store: Arc<MemoryProviderStore>,
    pub app: Arc<FinalityProviderApp>,
    pub config: AppConfig,
}

impl TestHarness {
    pub fn new(config: AppConfig) -> Self {
        let chain = Arc::new(SimulatedChain::new(config.devnet.activated_height));
        let signer = Arc::new(LocalEotsManager::new_in_memory());
        let store = Arc::new(MemoryProviderStore::new());

        let client: Arc<dyn ClientController> = chain.clone();
        let signer_dyn: Arc<dyn EotsManager> = signer.clone();
        let store_dyn: Arc<dyn ProviderStore> = store.clone();
        let app = Arc::new(FinalityProviderApp::new(store_dyn, client, signer_dyn, config.clone()));
        app.start().expect("app start");

        Self { chain, signer, store, app, config }
    }

    /// Timings tightened so scenarios settle within a few hundred ms.
    pub fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.network = "devnet".to_string();
        config.poller.poll_interval_ms = 10;
        config.poller.buffer_size = 16;
        config.randomness.num_pub_rand = TEST_PUB_RAND_NUM;
        config.randomness.min_rand_height_gap = 10;
        config.randomness.commit_check_interval_ms = 25;
        config.fast_sync.fast_sync_gap = 3;
        config.submission.max_submission_retries = 3;
        config.submission.submission_retry_interval_ms = 10;
        config.submission.retry_after_failure_ms = 50;
        config.monitor.slashing_check_interval_ms = 25;
        config
    }

    pub fn chain_id(&self) -> ChainId {
        ChainId::from(TEST_CHAIN_ID)
    }

    pub fn scheduler(&self) -> RandomnessScheduler {
        let client: Arc<dyn ClientController> = self.chain.clone();
        let signer: Arc<dyn EotsManager> = self.signer.clone();
        RandomnessScheduler::new(client, signer, self.config.randomness.clone())
    }

    pub async fn create_and_register_provider(&self, key_name: &str) -> BtcPublicKey {
        let record = self
            .app
            .create_finality_provider(
                &KeyName::from(key_name),
                &self.chain_id(),
                "test provider",
                "0.05",
                "",
                "",
            )
            .await
            .expect("create provider");
        self.app.register_finality_provider(&record.btc_pk).await.expect("register provider");
        record.btc_pk
    }

    pub async fn start_instance(&self, btc_pk: &BtcPublicKey) -> Arc<FinalityProviderInstance> {
        self.app
            .start_handling_finality_provider(btc_pk)
            .await
            .expect("start instance");
        self.app.get_finality_provider_instance(btc_pk).expect("instance registered")
    }

    pub fn stored_record(&self, btc_pk: &BtcPublicKey) -> ProviderRecord {
        self.store
            .get_provider(btc_pk)
            .expect("store read")
            .expect("provider exists")
    }
}
