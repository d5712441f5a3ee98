// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API under `/api/dapps`.
//!
//! Operations answer `200` with `{"success": true, ...}` or
//! `{"success": false, "error": "..."}`. Routes a dapp declares in its
//! `routes.json` are served at `/api/dapps/<id>/api/<path>`, and the first
//! mounted dapp also at `/api/dapps/default/api/<path>`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, on, post, MethodFilter},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::error;

use crate::application::dapp_service::DappService;
use crate::application::registry::RouteMethod;
use crate::domain::dapp::DappListFilter;

pub fn app(service: Arc<DappService>) -> Router {
    let forwarded = MethodFilter::GET.or(MethodFilter::POST).or(MethodFilter::PUT);
    Router::new()
        .route("/api/dapps", get(list_handler))
        .route("/api/dapps/get", get(get_handler))
        .route("/api/dapps/installed", get(installed_handler))
        .route("/api/dapps/installedIds", get(installed_ids_handler))
        .route("/api/dapps/installing", get(installing_handler))
        .route("/api/dapps/removing", get(removing_handler))
        .route("/api/dapps/launched", get(launched_handler))
        .route("/api/dapps/categories", get(categories_handler))
        .route("/api/dapps/ismasterpasswordenabled", get(master_password_handler))
        .route("/api/dapps/install", post(install_handler))
        .route("/api/dapps/uninstall", post(uninstall_handler))
        .route("/api/dapps/launch", post(launch_handler))
        .route("/api/dapps/stop", post(stop_handler))
        .route("/api/dapps/{prefix}/api/", on(forwarded, forward_root_handler))
        .route("/api/dapps/{prefix}/api/{*path}", on(forwarded, forward_handler))
        .with_state(service)
}

fn success(fields: Value) -> Json<Value> {
    let mut body = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    body.insert("success".to_string(), Value::Bool(true));
    Json(Value::Object(body))
}

fn failure(e: impl Display) -> Json<Value> {
    Json(json!({ "success": false, "error": e.to_string() }))
}

#[derive(Debug, Deserialize)]
struct IdQuery {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LifecycleRequest {
    id: String,
    #[serde(default)]
    master: Option<String>,
    #[serde(default)]
    params: Option<Vec<String>>,
}

async fn list_handler(
    State(service): State<Arc<DappService>>,
    Query(filter): Query<DappListFilter>,
) -> Json<Value> {
    match service.list(filter).await {
        Ok(dapps) => success(json!({ "dapps": dapps })),
        Err(e) => failure(e),
    }
}

async fn get_handler(State(service): State<Arc<DappService>>, Query(query): Query<IdQuery>) -> Json<Value> {
    match service.get(&query.id).await {
        Ok(dapp) => success(json!({ "dapp": dapp })),
        Err(e) => failure(e),
    }
}

async fn installed_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    match service.installed().await {
        Ok(dapps) => success(json!({ "dapps": dapps })),
        Err(e) => failure(e),
    }
}

async fn installed_ids_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    match service.installed_ids().await {
        Ok(ids) => success(json!({ "ids": ids })),
        Err(e) => failure(e),
    }
}

async fn installing_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    success(json!({ "installing": service.installing_ids() }))
}

async fn removing_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    success(json!({ "removing": service.removing_ids() }))
}

async fn launched_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    success(json!({ "launched": service.launched_ids() }))
}

async fn categories_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    success(json!({ "categories": service.categories() }))
}

async fn master_password_handler(State(service): State<Arc<DappService>>) -> Json<Value> {
    success(json!({ "enabled": service.is_master_password_enabled() }))
}

async fn install_handler(
    State(service): State<Arc<DappService>>,
    Json(request): Json<LifecycleRequest>,
) -> Json<Value> {
    match service.install(&request.id, request.master.as_deref()).await {
        Ok(path) => success(json!({ "path": path.display().to_string() })),
        Err(e) => failure(e),
    }
}

async fn uninstall_handler(
    State(service): State<Arc<DappService>>,
    Json(request): Json<LifecycleRequest>,
) -> Json<Value> {
    match service.uninstall(&request.id, request.master.as_deref()).await {
        Ok(()) => success(Value::Null),
        Err(e) => failure(e),
    }
}

async fn launch_handler(
    State(service): State<Arc<DappService>>,
    Json(request): Json<LifecycleRequest>,
) -> Json<Value> {
    match service
        .launch(&request.id, request.params, request.master.as_deref())
        .await
    {
        Ok(_) => success(Value::Null),
        Err(e) => failure(e),
    }
}

async fn stop_handler(
    State(service): State<Arc<DappService>>,
    Json(request): Json<LifecycleRequest>,
) -> Json<Value> {
    match service.stop(&request.id, request.master.as_deref()).await {
        Ok(_) => success(Value::Null),
        Err(e) => failure(e),
    }
}

async fn forward_root_handler(
    State(service): State<Arc<DappService>>,
    method: Method,
    Path(prefix): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    forward(&service, method, &prefix, "/", query, body).await
}

async fn forward_handler(
    State(service): State<Arc<DappService>>,
    method: Method,
    Path((prefix, path)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    forward(&service, method, &prefix, &format!("/{}", path), query, body).await
}

/// GET passes the query string, POST and PUT the JSON body.
async fn forward(
    service: &DappService,
    method: Method,
    prefix: &str,
    path: &str,
    query: HashMap<String, String>,
    body: Bytes,
) -> Response {
    let Some(route_method) = RouteMethod::parse(method.as_str()) else {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    };
    let Some((dapp_id, route)) = service.resolve_route(prefix, route_method, path) else {
        return (StatusCode::NOT_FOUND, failure("Route not found")).into_response();
    };

    let payload = if route_method == RouteMethod::Get {
        json!(query)
    } else if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => return failure(format!("Invalid JSON body: {}", e)).into_response(),
        }
    };

    match service
        .request(&dapp_id, route_method.as_str(), &route.path, payload)
        .await
    {
        Ok(Value::Object(mut reply)) => match reply.get("error") {
            Some(err) if !err.is_null() => {
                let message = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
                failure(message).into_response()
            }
            _ => {
                reply.insert("success".to_string(), Value::Bool(true));
                Json(Value::Object(reply)).into_response()
            }
        },
        Ok(other) => success(json!({ "data": other })).into_response(),
        Err(e) => {
            error!(dapp_id = %dapp_id, path = %path, error = %e, "Dapp request failed");
            failure(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dapp_service::DappServiceDeps;
    use crate::application::launch::test_support::{write_bundle, MockRuntime};
    use crate::domain::dapp::DappRecord;
    use crate::domain::node_config::DappsConfig;
    use crate::domain::repository::DappRepository;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::{
        InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository,
        InMemoryPeerRegistry, InMemorySchemaProvisioner, InMemoryTransferRepository,
        RecordingTransactionSubmitter,
    };
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn service(dir: &TempDir) -> Arc<DappService> {
        let dapps = Arc::new(InMemoryDappRepository::new());
        dapps
            .save(&DappRecord {
                transaction_id: "d1".into(),
                name: "One".into(),
                description: None,
                tags: None,
                link: Some("https://example.com/d1.zip".into()),
                icon: None,
                category: 0,
                dapp_type: 0,
                author_id: "1".into(),
                block_id: None,
                block_height: None,
            })
            .await
            .unwrap();
        let config = DappsConfig {
            base_dir: dir.path().to_path_buf(),
            public_dir: dir.path().join("public"),
            tmp_dir: dir.path().join("tmp"),
            ..DappsConfig::default()
        };
        let deps = DappServiceDeps {
            dapps,
            transfers: Arc::new(InMemoryTransferRepository::new()),
            assets: Arc::new(InMemoryAssetRepository::new()),
            accounts: Arc::new(InMemoryAccountLedger::new()),
            peers: Arc::new(InMemoryPeerRegistry::new()),
            schema: Arc::new(InMemorySchemaProvisioner::new()),
            submitter: Arc::new(RecordingTransactionSubmitter::new()),
            runtime: Arc::new(MockRuntime::default()),
            event_bus: EventBus::new(16),
        };
        Arc::new(DappService::new(config, deps).await.unwrap())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn lifecycle_queries() {
        let dir = TempDir::new().unwrap();
        let app = app(service(&dir).await);

        let (status, body) = send(app.clone(), get("/api/dapps/installedIds")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "ids": []}));

        let (_, body) = send(app.clone(), get("/api/dapps/categories")).await;
        assert_eq!(body["categories"]["Common"], 0);

        let (_, body) = send(app.clone(), get("/api/dapps/launched")).await;
        assert_eq!(body, json!({"success": true, "launched": []}));

        let (_, body) = send(app.clone(), get("/api/dapps/ismasterpasswordenabled")).await;
        assert_eq!(body, json!({"success": true, "enabled": false}));

        let (_, body) = send(app, get("/api/dapps/get?id=zz")).await;
        assert_eq!(body, json!({"success": false, "error": "DApp not found"}));
    }

    #[tokio::test]
    async fn dapp_routes_forward_to_the_sandbox() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        write_bundle(&dir.path().join("dapps"), "d1");
        service.launch("d1", None, None).await.unwrap();
        let app = app(service.clone());

        let (_, body) = send(app.clone(), get("/api/dapps/d1/api/hello?x=1")).await;
        assert_eq!(body, json!({"success": false, "error": "Dapp not ready"}));

        service.registry().set_ready("d1");
        let (_, body) = send(app.clone(), get("/api/dapps/d1/api/hello?x=1")).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["path"], "/hello");
        assert_eq!(body["query"], json!({"x": "1"}));

        let request = Request::builder()
            .method("POST")
            .uri("/api/dapps/default/api/items/42")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"qty":3}"#))
            .unwrap();
        let (_, body) = send(app.clone(), request).await;
        assert_eq!(body["method"], "post");
        assert_eq!(body["path"], "/items/:id");
        assert_eq!(body["query"], json!({"qty": 3}));

        let (status, _) = send(app, get("/api/dapps/d1/api/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_is_idempotent_over_http() {
        let dir = TempDir::new().unwrap();
        let app = app(service(&dir).await);
        let stop = || {
            Request::builder()
                .method("POST")
                .uri("/api/dapps/stop")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"id":"d1"}"#))
                .unwrap()
        };
        assert_eq!(send(app.clone(), stop()).await.1, json!({"success": true}));
        assert_eq!(send(app, stop()).await.1, json!({"success": true}));
    }
}
