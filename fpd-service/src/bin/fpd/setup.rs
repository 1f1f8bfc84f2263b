use fpd_core::config::AppConfig;
use fpd_core::foundation::{ProviderError, Result};
use fpd_core::infrastructure::signer::LocalEotsManager;
use fpd_core::infrastructure::storage::RocksProviderStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .map_err(|err| ProviderError::ConfigError(err.to_string()))?;
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
    Ok(())
}

pub fn load_app_config() -> Result<AppConfig> {
    let config = fpd_core::config::load_app_config()?;
    if let Err(errors) = config.validate() {
        for err in &errors {
            warn!("config validation error: {}", err);
        }
        return Err(ProviderError::ConfigError(format!("{} invalid config value(s)", errors.len())));
    }
    Ok(config)
}

pub fn resolve_data_dir(config: &AppConfig) -> Result<PathBuf> {
    if !config.data_dir.trim().is_empty() {
        return Ok(PathBuf::from(config.data_dir.trim()));
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".fpd"))
}

pub fn init_storage(data_dir: &PathBuf) -> Result<Arc<RocksProviderStore>> {
    RocksProviderStore::open_in_dir(data_dir).map(Arc::new)
}

pub fn init_signer(data_dir: &PathBuf) -> Result<Arc<LocalEotsManager>> {
    LocalEotsManager::open(data_dir).map(Arc::new)
}
