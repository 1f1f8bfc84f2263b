use crate::config::types::AppConfig;
use crate::config::{CONFIG_PATH_ENV, DATA_DIR_ENV};
use crate::foundation::Result;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Load configuration from an explicit TOML file, layered over defaults.
pub fn load_app_config_from_path(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path)?;
    let parsed: AppConfig = toml::from_str(&contents)?;
    let mut config = AppConfig::default();
    config.merge_from(&parsed);
    apply_env_overrides(&mut config);
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Load configuration from `FPD_CONFIG` if set, defaults otherwise.
pub fn load_app_config() -> Result<AppConfig> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return load_app_config_from_path(Path::new(trimmed));
        }
    }
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(data_dir) = env::var(DATA_DIR_ENV) {
        if !data_dir.trim().is_empty() {
            config.data_dir = data_dir;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fpd.toml");
        fs::write(
            &path,
            r#"
            network = "devnet"
            data_dir = "/tmp/fpd-test"

            [fast_sync]
            fast_sync_gap = 3
            "#,
        )
        .unwrap();

        let config = load_app_config_from_path(&path).unwrap();
        assert_eq!(config.network, "devnet");
        assert_eq!(config.data_dir, "/tmp/fpd-test");
        assert_eq!(config.fast_sync.fast_sync_gap, 3);
        // untouched sections keep their defaults
        assert_eq!(config.randomness.num_pub_rand, 100);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_app_config_from_path(Path::new("/nonexistent/fpd.toml")).is_err());
    }
}
