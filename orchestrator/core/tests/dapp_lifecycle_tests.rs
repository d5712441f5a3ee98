// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end dapp lifecycle: install from a remote bundle, launch into a
//! scripted sandbox, serve its routes over HTTP, stop and uninstall.

use aegis_dapps_core::application::{DappService, DappServiceDeps};
use aegis_dapps_core::domain::dapp::DappRecord;
use aegis_dapps_core::domain::events::DappEvent;
use aegis_dapps_core::domain::node_config::DappsConfig;
use aegis_dapps_core::domain::repository::DappRepository;
use aegis_dapps_core::domain::sandbox::{
    LaunchSpec, SandboxCall, SandboxError, SandboxEvent, SandboxHandle, SandboxRequest,
    SandboxRuntime, StartedSandbox,
};
use aegis_dapps_core::infrastructure::event_bus::EventBus;
use aegis_dapps_core::infrastructure::repositories::{
    InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository, InMemoryPeerRegistry,
    InMemorySchemaProvisioner, InMemoryTransferRepository, RecordingTransactionSubmitter,
};
use aegis_dapps_core::presentation::api;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower::ServiceExt;
use uuid::Uuid;

struct ScriptedHandle {
    instance: Uuid,
    stops: AtomicUsize,
}

#[async_trait]
impl SandboxHandle for ScriptedHandle {
    fn instance_id(&self) -> Uuid {
        self.instance
    }

    async fn request(&self, request: SandboxRequest) -> Result<Value, SandboxError> {
        if request.path == "/fail" {
            return Ok(json!({ "error": "boom" }));
        }
        Ok(json!({ "echo": request.path, "query": request.query }))
    }

    async fn stop(&self) -> Result<(), SandboxError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct ScriptedRuntime {
    specs: Mutex<Vec<LaunchSpec>>,
    events: Mutex<Vec<mpsc::Sender<SandboxEvent>>>,
    handles: Mutex<Vec<Arc<ScriptedHandle>>>,
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn start(&self, spec: LaunchSpec) -> Result<StartedSandbox, SandboxError> {
        let handle = Arc::new(ScriptedHandle {
            instance: spec.instance_id,
            stops: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::channel(8);
        self.specs.lock().push(spec);
        self.events.lock().push(tx);
        self.handles.lock().push(handle.clone());
        Ok(StartedSandbox { handle, events: rx })
    }
}

impl ScriptedRuntime {
    /// Issue a shared API call from the most recent sandbox.
    async fn call(&self, call: &str, args: Value) -> Result<Value, String> {
        let sender = self.events.lock().last().cloned().expect("no sandbox started");
        let (reply, response) = oneshot::channel();
        sender
            .send(SandboxEvent::Call {
                call: SandboxCall {
                    call: call.to_string(),
                    args,
                    application_id: String::new(),
                },
                reply,
            })
            .await
            .unwrap();
        response.await.unwrap()
    }
}

struct Node {
    service: Arc<DappService>,
    runtime: Arc<ScriptedRuntime>,
    event_bus: EventBus,
    dir: TempDir,
}

fn bundle() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    let files = [
        ("app/index.js", "// entry"),
        ("app/config.json", r#"{"peers":[]}"#),
        ("app/blockchain.json", r#"{"tables":[]}"#),
        (
            "app/routes.json",
            r#"[{"method":"get","path":"/hello"},{"method":"get","path":"/fail"}]"#,
        ),
        ("app/public/index.html", "<html></html>"),
    ];
    for (name, content) in files {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

async fn node(link: &str) -> Node {
    let dir = TempDir::new().unwrap();
    let dapps = Arc::new(InMemoryDappRepository::new());
    dapps
        .save(&DappRecord {
            transaction_id: "d1".into(),
            name: "Chat".into(),
            description: None,
            tags: None,
            link: Some(link.to_string()),
            icon: None,
            category: 7,
            dapp_type: 0,
            author_id: "1000".into(),
            block_id: None,
            block_height: None,
        })
        .await
        .unwrap();
    let runtime = Arc::new(ScriptedRuntime::default());
    let event_bus = EventBus::new(64);
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
        runtime: runtime.clone(),
        event_bus: event_bus.clone(),
    };
    let service = Arc::new(DappService::new(config, deps).await.unwrap());
    Node {
        service,
        runtime,
        event_bus,
        dir,
    }
}

/// Serve `body` under a declared `content_length` on every connection,
/// holding each response for `delay`. The connection closes after the body.
async fn serve_raw(body: Vec<u8>, content_length: usize, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = vec![0u8; 4096];
                let _ = socket.read(&mut request).await;
                tokio::time::sleep(delay).await;
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/zip\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    content_length
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}/chat.zip", addr)
}

async fn get_json(app: axum::Router, uri: &str) -> Value {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/chat.zip")
        .with_status(200)
        .with_body(bundle())
        .create_async()
        .await;
    let node = node(&format!("{}/chat.zip", server.url())).await;
    let mut events = node.event_bus.subscribe_dapp("d1");
    let app = api::app(node.service.clone());

    let path = node.service.install("d1", None).await.unwrap();
    assert!(path.join("routes.json").is_file());
    assert_eq!(
        get_json(app.clone(), "/api/dapps/installedIds").await,
        json!({"success": true, "ids": ["d1"]})
    );

    node.service.launch("d1", None, None).await.unwrap();
    assert_eq!(node.service.launched_ids(), vec!["d1".to_string()]);
    let spec = node.runtime.specs.lock()[0].clone();
    assert_eq!(spec.params, vec!["".to_string(), "modules.full.json".to_string()]);
    #[cfg(unix)]
    assert!(node.dir.path().join("public/dapps/d1").exists());

    let body = get_json(app.clone(), "/api/dapps/d1/api/hello").await;
    assert_eq!(body, json!({"success": false, "error": "Dapp not ready"}));

    node.runtime.call("dapps#setReady", json!({})).await.unwrap();
    let body = get_json(app.clone(), "/api/dapps/d1/api/hello?q=1").await;
    assert_eq!(body, json!({"success": true, "echo": "/hello", "query": {"q": "1"}}));
    let body = get_json(app.clone(), "/api/dapps/default/api/fail").await;
    assert_eq!(body, json!({"success": false, "error": "boom"}));

    assert!(node.service.stop("d1", None).await.unwrap());
    assert!(!node.service.stop("d1", None).await.unwrap());
    assert_eq!(node.runtime.handles.lock()[0].stops.load(Ordering::SeqCst), 1);

    node.service.uninstall("d1", None).await.unwrap();
    assert!(!path.exists());
    assert!(!node.dir.path().join("public/dapps/d1").exists());

    let mut seen = Vec::new();
    for _ in 0..4 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        seen.push(match event {
            DappEvent::Installed { .. } => "installed",
            DappEvent::Launched { .. } => "launched",
            DappEvent::Stopped { .. } => "stopped",
            DappEvent::Uninstalled { .. } => "uninstalled",
            _ => "other",
        });
    }
    assert_eq!(seen, vec!["installed", "launched", "stopped", "uninstalled"]);
}

#[tokio::test]
async fn install_is_exclusive_per_dapp() {
    let node = node("https://example.com/chat.zip").await;
    node.service.registry().begin_install("d1").unwrap();

    let err = node.service.install("d1", None).await.unwrap_err();
    assert_eq!(err.to_string(), "This DApp already on downloading/removing");
    let err = node.service.uninstall("d1", None).await.unwrap_err();
    assert_eq!(err.to_string(), "This DApp already on uninstall/loading");
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/chat.zip")
        .with_status(404)
        .create_async()
        .await;
    let node = node(&format!("{}/chat.zip", server.url())).await;

    let err = node.service.install("d1", None).await.unwrap_err();
    assert!(err.to_string().starts_with("d1 Installation failed"));
    assert!(!node.dir.path().join("dapps/d1").exists());
    assert!(node.service.installing_ids().is_empty());
    assert!(node.service.installed_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn truncated_download_leaves_nothing_behind() {
    let link = serve_raw(b"PK\x03\x04partial".to_vec(), 4096, Duration::ZERO).await;
    let node = node(&link).await;

    let err = node.service.install("d1", None).await.unwrap_err();
    assert!(err
        .to_string()
        .starts_with(&format!("d1 Installation failed: Failed to download dapp {} with error:", link)));
    assert!(!node.dir.path().join("dapps/d1").exists());
    assert!(!node.dir.path().join("tmp/d1.zip").exists());
    assert!(node.service.installing_ids().is_empty());
    assert!(node.service.installed_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_installs_admit_one() {
    let body = bundle();
    let link = serve_raw(body.clone(), body.len(), Duration::from_millis(300)).await;
    let node = node(&link).await;

    let (first, second) = tokio::join!(
        node.service.install("d1", None),
        node.service.install("d1", None)
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let err = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(err.to_string(), "This DApp already on downloading/removing");

    assert!(node.dir.path().join("dapps/d1/routes.json").is_file());
    assert!(!node.dir.path().join("tmp/d1.zip").exists());
    assert_eq!(node.service.installed_ids().await.unwrap(), vec!["d1".to_string()]);
}

#[tokio::test]
async fn launch_requires_install() {
    let node = node("https://example.com/chat.zip").await;
    let err = node.service.launch("d1", None, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Dapp not installed");
    assert!(node.runtime.specs.lock().is_empty());
    assert!(node.service.launched_ids().is_empty());
}

#[tokio::test]
async fn sandbox_exit_stops_the_dapp() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/chat.zip")
        .with_status(200)
        .with_body(bundle())
        .create_async()
        .await;
    let node = node(&format!("{}/chat.zip", server.url())).await;
    node.service.install("d1", None).await.unwrap();
    node.service.launch("d1", None, None).await.unwrap();

    let sender = node.runtime.events.lock()[0].clone();
    sender.send(SandboxEvent::Exit { code: Some(1) }).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !node.service.launched_ids().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(node.runtime.handles.lock()[0].stops.load(Ordering::SeqCst), 1);
}
