mod harness;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use fpd_service::api::{build_router, RpcState};
use harness::TestHarness;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn rpc_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn create_and_query_through_the_rpc_surface() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let state = Arc::new(RpcState { app: tm.app.clone(), rpc_token: None });
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "create_finality_provider",
            "params": { "key_name": "api-test", "chain_id": "chain-test" }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let btc_pk = body["result"]["btc_pk"].as_str().unwrap().to_string();
    assert_eq!(body["result"]["status"], "CREATED");

    let response = router
        .clone()
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "register_finality_provider",
            "params": { "btc_pk": btc_pk }
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert!(body["result"]["tx_hash"].as_str().unwrap().len() > 0);

    let response = router
        .clone()
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "query_finality_provider_list",
            "params": null
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["result"].as_array().unwrap().len(), 1);
    assert_eq!(body["result"][0]["status"], "REGISTERED");

    let response = router
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "get_info",
            "params": null
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["result"]["num_finality_providers"], 1);
}

#[tokio::test]
async fn unknown_method_and_bad_params_are_rpc_errors() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let state = Arc::new(RpcState { app: tm.app.clone(), rpc_token: None });
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "no_such_method",
            "params": null
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], -32601);

    let response = router
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "query_finality_provider",
            "params": { "btc_pk": "not-hex" }
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], -32602);
}

#[tokio::test]
async fn bearer_token_gates_the_rpc_endpoint() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let state = Arc::new(RpcState { app: tm.app.clone(), rpc_token: Some("secret".to_string()) });
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(rpc_request(json!({
            "jsonrpc": "2.0", "id": 1, "method": "get_info", "params": null
        })))
        .await
        .unwrap();
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], -32001);

    let request = Request::builder()
        .method("POST")
        .uri("/rpc")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::from(
            json!({ "jsonrpc": "2.0", "id": 2, "method": "get_info", "params": null }).to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let body = response_json(response).await;
    assert!(body["result"]["version"].as_str().is_some());
}

#[tokio::test]
async fn health_and_ready_respond() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let state = Arc::new(RpcState { app: tm.app.clone(), rpc_token: None });
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
