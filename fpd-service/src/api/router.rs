use super::handlers::health::{handle_health, handle_ready};
use super::handlers::rpc::handle_rpc;
use super::middleware::logging::logging_middleware;
use super::state::RpcState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use fpd_core::foundation::{ProviderError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub async fn run_json_rpc_server(addr: SocketAddr, state: Arc<RpcState>) -> Result<()> {
    info!(%addr, "binding json-rpc server");
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "json-rpc server accepting connections");
    axum::serve(listener, app).await.map_err(|err| {
        error!(%addr, error = %err, "json-rpc server terminated unexpectedly");
        ProviderError::RpcError(err.to_string())
    })
}

pub fn build_router(state: Arc<RpcState>) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}
