use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level daemon configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub data_dir: String,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub randomness: RandomnessConfig,
    #[serde(default)]
    pub fast_sync: FastSyncConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub devnet: DevnetConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Start from the chain's activation height instead of
    /// `static_start_height`.
    #[serde(default = "default_true")]
    pub auto_chain_scanning_mode: bool,
    #[serde(default = "default_start_height")]
    pub static_chain_scanning_start_height: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomnessConfig {
    /// Number of pub rand values per commit.
    #[serde(default = "default_num_pub_rand")]
    pub num_pub_rand: u32,
    /// Commit a fresh batch when fewer than this many committed heights
    /// remain ahead of the current one.
    #[serde(default = "default_min_rand_height_gap")]
    pub min_rand_height_gap: u64,
    #[serde(default = "default_commit_check_interval_ms")]
    pub commit_check_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastSyncConfig {
    /// Trigger catch-up when the finalized tip is more than this many
    /// heights ahead of the last processed one.
    #[serde(default = "default_fast_sync_gap")]
    pub fast_sync_gap: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_max_submission_retries")]
    pub max_submission_retries: u32,
    #[serde(default = "default_submission_retry_interval_ms")]
    pub submission_retry_interval_ms: u64,
    /// Pause before re-attempting a block after retries are exhausted.
    #[serde(default = "default_retry_after_failure_ms")]
    pub retry_after_failure_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_slashing_check_interval_ms")]
    pub slashing_check_interval_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rpc_addr")]
    pub addr: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Parameters of the in-process devnet chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevnetConfig {
    #[serde(default = "default_activated_height")]
    pub activated_height: u64,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// How many blocks the finalized tip trails the best block.
    #[serde(default = "default_finality_lag")]
    pub finality_lag: u64,
}

fn default_true() -> bool {
    true
}

fn default_start_height() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_buffer_size() -> usize {
    100
}

fn default_num_pub_rand() -> u32 {
    100
}

fn default_min_rand_height_gap() -> u64 {
    20
}

fn default_commit_check_interval_ms() -> u64 {
    5_000
}

fn default_fast_sync_gap() -> u64 {
    6
}

fn default_max_submission_retries() -> u32 {
    5
}

fn default_submission_retry_interval_ms() -> u64 {
    500
}

fn default_retry_after_failure_ms() -> u64 {
    5_000
}

fn default_slashing_check_interval_ms() -> u64 {
    10_000
}

fn default_rpc_addr() -> String {
    "127.0.0.1:15812".to_string()
}

fn default_activated_height() -> u64 {
    1
}

fn default_block_time_ms() -> u64 {
    1_000
}

fn default_finality_lag() -> u64 {
    2
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            auto_chain_scanning_mode: default_true(),
            static_chain_scanning_start_height: default_start_height(),
            poll_interval_ms: default_poll_interval_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl Default for RandomnessConfig {
    fn default() -> Self {
        Self {
            num_pub_rand: default_num_pub_rand(),
            min_rand_height_gap: default_min_rand_height_gap(),
            commit_check_interval_ms: default_commit_check_interval_ms(),
        }
    }
}

impl Default for FastSyncConfig {
    fn default() -> Self {
        Self { fast_sync_gap: default_fast_sync_gap() }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_submission_retries: default_max_submission_retries(),
            submission_retry_interval_ms: default_submission_retry_interval_ms(),
            retry_after_failure_ms: default_retry_after_failure_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { slashing_check_interval_ms: default_slashing_check_interval_ms() }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { enabled: false, addr: default_rpc_addr(), token: None }
    }
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            activated_height: default_activated_height(),
            block_time_ms: default_block_time_ms(),
            finality_lag: default_finality_lag(),
        }
    }
}

impl AppConfig {
    /// Merge fields from `other`, overriding only where `other` provides a
    /// non-empty value.
    pub fn merge_from(&mut self, other: &AppConfig) {
        if !other.network.trim().is_empty() {
            self.network = other.network.clone();
        }
        if !other.data_dir.trim().is_empty() {
            self.data_dir = other.data_dir.clone();
        }
        self.poller = other.poller.clone();
        self.randomness = other.randomness.clone();
        self.fast_sync = other.fast_sync.clone();
        self.submission = other.submission.clone();
        self.monitor = other.monitor.clone();
        self.rpc.merge_from(&other.rpc);
        self.devnet = other.devnet.clone();
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.poller.buffer_size == 0 {
            errors.push("poller.buffer_size must be positive".to_string());
        }
        if self.poller.poll_interval_ms == 0 {
            errors.push("poller.poll_interval_ms must be positive".to_string());
        }
        if self.randomness.num_pub_rand == 0 {
            errors.push("randomness.num_pub_rand must be positive".to_string());
        }
        if self.randomness.min_rand_height_gap as u128 > self.randomness.num_pub_rand as u128 {
            errors.push("randomness.min_rand_height_gap must not exceed randomness.num_pub_rand".to_string());
        }
        if self.submission.max_submission_retries == 0 {
            errors.push("submission.max_submission_retries must be positive".to_string());
        }
        if self.rpc.enabled && self.rpc.addr.trim().is_empty() {
            errors.push("rpc.addr must be set when rpc is enabled".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poller.poll_interval_ms)
    }
}

impl RpcConfig {
    fn merge_from(&mut self, other: &RpcConfig) {
        self.enabled = other.enabled;
        if !other.addr.trim().is_empty() {
            self.addr = other.addr.clone();
        }
        if other.token.is_some() {
            self.token = other.token.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overrides_non_empty() {
        let mut base = AppConfig::default();
        base.network = "devnet".into();
        base.data_dir = "/tmp/base".into();
        let mut incoming = AppConfig::default();
        incoming.data_dir = "/tmp/new".into();

        base.merge_from(&incoming);
        assert_eq!(base.network, "devnet");
        assert_eq!(base.data_dir, "/tmp/new");
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_flags_bad_values() {
        let mut config = AppConfig::default();
        config.poller.buffer_size = 0;
        config.randomness.num_pub_rand = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn toml_round_trip_keeps_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            network = "devnet"

            [randomness]
            num_pub_rand = 25
            min_rand_height_gap = 10
            "#,
        )
        .unwrap();
        assert_eq!(parsed.randomness.num_pub_rand, 25);
        assert_eq!(parsed.randomness.min_rand_height_gap, 10);
        assert_eq!(parsed.poller.poll_interval_ms, 1_000);
        assert!(parsed.poller.auto_chain_scanning_mode);
    }
}
