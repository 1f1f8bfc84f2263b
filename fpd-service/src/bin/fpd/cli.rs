use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fpd")]
#[command(about = "Finality provider daemon", long_about = None)]
pub struct Cli {
    /// Network to run against. `devnet` uses the in-process simulated
    /// chain; other networks require an external chain client build.
    #[arg(long, default_value = "devnet", value_name = "NETWORK")]
    #[arg(value_parser = ["devnet", "testnet", "mainnet"])]
    pub network: String,

    /// Path to the TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Override the JSON-RPC listen address
    #[arg(long)]
    pub rpc_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate_only: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn apply_to_env(&self) {
        if let Some(config_path) = &self.config {
            std::env::set_var(fpd_core::config::CONFIG_PATH_ENV, config_path);
        }
        if let Some(data_dir) = &self.data_dir {
            std::env::set_var(fpd_core::config::DATA_DIR_ENV, data_dir);
        }
    }
}
