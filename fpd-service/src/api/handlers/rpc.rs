use crate::api::json_rpc::{
    rpc_err, rpc_ok, JsonRpcRequest, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, UNAUTHORIZED,
};
use crate::api::state::RpcState;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use fpd_core::domain::{BlockInfo, ProviderRecord};
use fpd_core::foundation::{BlockHash, BtcPublicKey, ChainId, KeyName, ProviderError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ProviderInfo {
    btc_pk: String,
    babylon_pk: String,
    key_name: String,
    chain_id: String,
    description: String,
    commission: String,
    last_voted_height: u64,
    last_processed_height: u64,
    status: String,
}

impl From<&ProviderRecord> for ProviderInfo {
    fn from(record: &ProviderRecord) -> Self {
        Self {
            btc_pk: record.btc_pk.to_string(),
            babylon_pk: record.babylon_pk.to_string(),
            key_name: record.key_name.to_string(),
            chain_id: record.chain_id.to_string(),
            description: record.description.clone(),
            commission: record.commission.clone(),
            last_voted_height: record.last_voted_height,
            last_processed_height: record.last_processed_height,
            status: record.status.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateFinalityProviderParams {
    key_name: String,
    chain_id: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_commission")]
    commission: String,
    #[serde(default)]
    hd_path: String,
    #[serde(default)]
    passphrase: String,
}

fn default_commission() -> String {
    "0".to_string()
}

#[derive(Debug, Deserialize)]
struct BtcPkParams {
    btc_pk: String,
}

#[derive(Debug, Deserialize)]
struct AddFinalitySignatureParams {
    btc_pk: String,
    height: u64,
    app_hash: String,
}

#[derive(Debug, Serialize)]
struct AddFinalitySignatureResult {
    tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_sk_hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_sk_hex: Option<String>,
}

pub async fn handle_rpc(
    State(state): State<Arc<RpcState>>,
    headers: HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    if let Some(expected) = &state.rpc_token {
        if !bearer_token_matches(&headers, expected) {
            return rpc_err(request.id, UNAUTHORIZED, "invalid or missing bearer token");
        }
    }

    debug!(method = %request.method, "rpc request");
    let id = request.id.clone();
    let params = request.params.unwrap_or(serde_json::Value::Null);
    let result = match request.method.as_str() {
        "get_info" => get_info(&state).await,
        "create_finality_provider" => create_finality_provider(&state, params).await,
        "register_finality_provider" => register_finality_provider(&state, params).await,
        "add_finality_signature" => add_finality_signature(&state, params).await,
        "query_finality_provider" => query_finality_provider(&state, params).await,
        "query_finality_provider_list" => query_finality_provider_list(&state).await,
        _ => return rpc_err(id, METHOD_NOT_FOUND, format!("unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => rpc_ok(id, value),
        Err(RpcFailure::BadParams(message)) => rpc_err(id, INVALID_PARAMS, message),
        Err(RpcFailure::Provider(err)) => {
            rpc_err(id, INTERNAL_ERROR, format!("{:?}: {}", err.code(), err))
        }
    }
}

fn bearer_token_matches(headers: &HeaderMap, expected: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|header| header.to_str().ok()) else {
        return false;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return false;
    };
    token.as_bytes().ct_eq(expected.as_bytes()).into()
}

enum RpcFailure {
    BadParams(String),
    Provider(ProviderError),
}

impl From<ProviderError> for RpcFailure {
    fn from(err: ProviderError) -> Self {
        RpcFailure::Provider(err)
    }
}

type RpcResult = Result<serde_json::Value, RpcFailure>;

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcFailure> {
    serde_json::from_value(params).map_err(|err| RpcFailure::BadParams(err.to_string()))
}

fn parse_btc_pk(value: &str) -> Result<BtcPublicKey, RpcFailure> {
    value
        .parse()
        .map_err(|err: ProviderError| RpcFailure::BadParams(err.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> RpcResult {
    serde_json::to_value(value)
        .map_err(|err| RpcFailure::Provider(ProviderError::from(err)))
}

async fn get_info(state: &RpcState) -> RpcResult {
    let providers = state.app.query_finality_provider_list()?;
    let running = state.app.list_finality_provider_instances();
    to_json(&serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "num_finality_providers": providers.len(),
        "num_running_instances": running.len(),
    }))
}

async fn create_finality_provider(state: &RpcState, params: serde_json::Value) -> RpcResult {
    let params: CreateFinalityProviderParams = parse_params(params)?;
    if params.key_name.trim().is_empty() || params.chain_id.trim().is_empty() {
        return Err(RpcFailure::BadParams("key_name and chain_id are required".to_string()));
    }
    let record = state
        .app
        .create_finality_provider(
            &KeyName::from(params.key_name),
            &ChainId::from(params.chain_id),
            &params.description,
            &params.commission,
            &params.hd_path,
            &params.passphrase,
        )
        .await?;
    to_json(&ProviderInfo::from(&record))
}

async fn register_finality_provider(state: &RpcState, params: serde_json::Value) -> RpcResult {
    let params: BtcPkParams = parse_params(params)?;
    let btc_pk = parse_btc_pk(&params.btc_pk)?;
    let tx = state.app.register_finality_provider(&btc_pk).await?;
    to_json(&tx)
}

async fn add_finality_signature(state: &RpcState, params: serde_json::Value) -> RpcResult {
    let params: AddFinalitySignatureParams = parse_params(params)?;
    let btc_pk = parse_btc_pk(&params.btc_pk)?;
    let app_hash: BlockHash = params
        .app_hash
        .parse()
        .map_err(|err: ProviderError| RpcFailure::BadParams(err.to_string()))?;

    let instance = state.app.get_finality_provider_instance(&btc_pk)?;
    let block = BlockInfo::new(params.height, app_hash, false);
    let (tx, extracted_sk_hex, local_sk_hex) = instance.submit_finality_signature(&block).await?;
    to_json(&AddFinalitySignatureResult { tx_hash: tx.tx_hash, extracted_sk_hex, local_sk_hex })
}

async fn query_finality_provider(state: &RpcState, params: serde_json::Value) -> RpcResult {
    let params: BtcPkParams = parse_params(params)?;
    let btc_pk = parse_btc_pk(&params.btc_pk)?;
    let record = state.app.query_finality_provider(&btc_pk)?;
    to_json(&ProviderInfo::from(&record))
}

async fn query_finality_provider_list(state: &RpcState) -> RpcResult {
    let records = state.app.query_finality_provider_list()?;
    let infos: Vec<ProviderInfo> = records.iter().map(ProviderInfo::from).collect();
    to_json(&infos)
}
