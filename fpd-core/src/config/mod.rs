pub mod loader;
pub mod types;

pub use loader::{load_app_config, load_app_config_from_path};
pub use types::{
    AppConfig, DevnetConfig, FastSyncConfig, MonitorConfig, PollerConfig, RandomnessConfig,
    RpcConfig, SubmissionConfig,
};

/// Environment variable pointing at the TOML config file.
pub const CONFIG_PATH_ENV: &str = "FPD_CONFIG";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FPD_DATA_DIR";
