#[path = "fpd/cli.rs"]
mod cli;
#[path = "fpd/setup.rs"]
mod setup;

use cli::Cli;
use fpd_core::application::FinalityProviderApp;
use fpd_core::foundation::{ProviderError, Result};
use fpd_core::infrastructure::chain::{ClientController, SimulatedChain};
use fpd_core::infrastructure::signer::EotsManager;
use fpd_core::infrastructure::storage::ProviderStore;
use fpd_service::api::{run_json_rpc_server, RpcState};
use fpd_service::service::spawn_devnet_producer;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("fpd: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    setup::init_logging(&cli.log_level)?;
    cli.apply_to_env();

    let mut config = setup::load_app_config()?;
    config.network = cli.network.clone();
    if let Some(rpc_addr) = &cli.rpc_addr {
        config.rpc.enabled = true;
        config.rpc.addr = rpc_addr.clone();
    }

    if cli.validate_only {
        info!("configuration is valid");
        return Ok(());
    }

    if config.network != "devnet" {
        return Err(ProviderError::ConfigError(format!(
            "network {} requires an external chain client build; only devnet is wired in",
            config.network
        )));
    }

    let data_dir = setup::resolve_data_dir(&config)?;
    info!(data_dir = %data_dir.display(), network = %config.network, "starting fpd");

    let chain = Arc::new(SimulatedChain::new(config.devnet.activated_height));
    let client: Arc<dyn ClientController> = chain.clone();
    let store: Arc<dyn ProviderStore> = setup::init_storage(&data_dir)?;
    let signer: Arc<dyn EotsManager> = setup::init_signer(&data_dir)?;

    let app = Arc::new(FinalityProviderApp::new(store, client, signer, config.clone()));
    app.start()?;
    app.start_handling_all().await?;

    let (devnet_shutdown, devnet_rx) = watch::channel(false);
    let producer = spawn_devnet_producer(chain.clone(), config.devnet.clone(), devnet_rx);

    let mut rpc_handle = None;
    if config.rpc.enabled {
        let addr: std::net::SocketAddr = config
            .rpc
            .addr
            .parse()
            .map_err(|_| ProviderError::ConfigError(format!("invalid rpc addr: {}", config.rpc.addr)))?;
        let state = Arc::new(RpcState { app: app.clone(), rpc_token: config.rpc.token.clone() });
        rpc_handle = Some(tokio::spawn(async move {
            if let Err(err) = run_json_rpc_server(addr, state).await {
                error!(error = %err, "json-rpc server exited");
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = devnet_shutdown.send(true);
    let _ = producer.await;
    if let Some(handle) = rpc_handle {
        handle.abort();
    }
    app.stop().await?;
    Ok(())
}
