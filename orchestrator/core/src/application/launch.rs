// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Launch Orchestrator
//!
//! ```text
//! LoadRecord → CheckInstalled → LinkPublicAssets → ReadManifests
//!   → RegisterPeers → ProvisionTables → StartSandbox → MountRoutes → Running
//! ```
//!
//! A failure before `StartSandbox` only marks the launch failed. From
//! `StartSandbox` on, the sandbox is torn down through [`Teardown::stop`].
//!
//! Each started sandbox gets an observer task that serves the dapp's module
//! calls and, when the process exits or errors, stops exactly that instance.

use chrono::Utc;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::bridge::ModuleTable;
use crate::application::install::installed_ids;
use crate::application::registry::{DappRegistry, DappRoute, RouteMethod};
use crate::application::teardown::Teardown;
use crate::domain::dapp::DappError;
use crate::domain::events::DappEvent;
use crate::domain::lifecycle::{DappPhase, LaunchStage};
use crate::domain::repository::{DappRepository, PeerAddress, PeerRegistry, SchemaProvisioner};
use crate::domain::sandbox::{LaunchSpec, SandboxEvent, SandboxRuntime};
use crate::infrastructure::event_bus::EventBus;

/// Appended to every parameter list handed to a sandbox.
pub const MODULES_PARAM: &str = "modules.full.json";

/// Read and parse `<dapp_path>/<file>`.
pub(crate) async fn read_manifest<T: DeserializeOwned>(
    dapp_path: &Path,
    file: &str,
    id: &str,
) -> Result<T, DappError> {
    read_optional_manifest(dapp_path, file, id)
        .await?
        .ok_or_else(|| DappError::Io(format!("Failed to read {} file for: {}", file, id)))
}

/// Like [`read_manifest`], but an absent file is `None`.
async fn read_optional_manifest<T: DeserializeOwned>(
    dapp_path: &Path,
    file: &str,
    id: &str,
) -> Result<Option<T>, DappError> {
    let failed = || DappError::Io(format!("Failed to read {} file for: {}", file, id));
    let raw = match tokio::fs::read_to_string(dapp_path.join(file)).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(_) => return Err(failed()),
    };
    serde_json::from_str(&raw).map(Some).map_err(|e| {
        debug!(dapp_id = %id, file, error = %e, "Malformed manifest");
        failed()
    })
}

/// Sandbox arguments: requested params (`[""]` when none) plus [`MODULES_PARAM`].
pub fn launch_params(params: Option<Vec<String>>) -> Vec<String> {
    let mut params = params.filter(|p| !p.is_empty()).unwrap_or_else(|| vec![String::new()]);
    params.push(MODULES_PARAM.to_string());
    params
}

#[derive(Debug, Default, Deserialize)]
struct DappManifestConfig {
    #[serde(default)]
    peers: Vec<PeerAddress>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    method: String,
    path: String,
}

struct Manifests {
    config: DappManifestConfig,
    schema: Value,
    routes: Vec<DappRoute>,
}

/// Paths and the interpreter invocation used for every launch.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub dapps_dir: PathBuf,
    pub public_dir: PathBuf,
    pub interpreter: String,
    pub entry_point: String,
}

pub struct LaunchOrchestrator {
    dapps: Arc<dyn DappRepository>,
    registry: Arc<DappRegistry>,
    runtime: Arc<dyn SandboxRuntime>,
    peers: Arc<dyn PeerRegistry>,
    schema: Arc<dyn SchemaProvisioner>,
    modules: Arc<ModuleTable>,
    teardown: Arc<Teardown>,
    settings: LaunchSettings,
    event_bus: EventBus,
}

impl LaunchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dapps: Arc<dyn DappRepository>,
        registry: Arc<DappRegistry>,
        runtime: Arc<dyn SandboxRuntime>,
        peers: Arc<dyn PeerRegistry>,
        schema: Arc<dyn SchemaProvisioner>,
        modules: Arc<ModuleTable>,
        teardown: Arc<Teardown>,
        settings: LaunchSettings,
        event_bus: EventBus,
    ) -> Self {
        Self {
            dapps,
            registry,
            runtime,
            peers,
            schema,
            modules,
            teardown,
            settings,
            event_bus,
        }
    }

    /// Launch installed dapp `id`, returning the sandbox instance id.
    pub async fn launch(&self, id: &str, params: Option<Vec<String>>) -> Result<Uuid, DappError> {
        self.registry.begin_launch(id)?;

        let mut stage = LaunchStage::LoadRecord;
        match self.run(id, launch_params(params), &mut stage).await {
            Ok(instance_id) => {
                counter!("dapp_launch_total", "outcome" => "success").increment(1);
                info!(dapp_id = %id, instance_id = %instance_id, "Dapp launched");
                self.event_bus.publish_dapp_event(DappEvent::Launched {
                    dapp_id: id.to_string(),
                    instance_id,
                    launched_at: Utc::now(),
                });
                Ok(instance_id)
            }
            Err(e) => {
                counter!("dapp_launch_total", "outcome" => "failure").increment(1);
                error!(dapp_id = %id, stage = %stage, error = %e, "Failed to launch dapp");
                if stage.requires_stop() {
                    if let Err(stop_err) = self.teardown.stop(id, None).await {
                        warn!(dapp_id = %id, error = %stop_err, "Failed to stop dapp after launch failure");
                    }
                }
                self.registry.abort_launch(id);
                Err(e)
            }
        }
    }

    async fn run(&self, id: &str, params: Vec<String>, stage: &mut LaunchStage) -> Result<Uuid, DappError> {
        self.dapps
            .find_by_id(id)
            .await?
            .ok_or_else(|| DappError::NotFound("DApp not found".to_string()))?;

        *stage = LaunchStage::CheckInstalled;
        if !installed_ids(&self.settings.dapps_dir, &self.registry)
            .await?
            .iter()
            .any(|installed| installed == id)
        {
            return Err(DappError::Validation("Dapp not installed".to_string()));
        }
        let dapp_path = self.settings.dapps_dir.join(id);

        *stage = LaunchStage::LinkPublicAssets;
        self.link_public_assets(id, &dapp_path).await?;

        *stage = LaunchStage::ReadManifests;
        let manifests = read_manifests(&dapp_path, id).await?;

        *stage = LaunchStage::RegisterPeers;
        for peer in &manifests.config.peers {
            self.peers.add_dapp_peer(id, peer).await?;
        }

        *stage = LaunchStage::ProvisionTables;
        self.schema.create_tables(id, &manifests.schema).await?;

        *stage = LaunchStage::StartSandbox;
        if self.registry.phase(id) != Some(DappPhase::Launching) {
            return Err(DappError::Conflict("Dapp launch cancelled".to_string()));
        }
        let instance_id = Uuid::new_v4();
        let started = self
            .runtime
            .start(LaunchSpec {
                application_id: id.to_string(),
                instance_id,
                working_dir: dapp_path.clone(),
                interpreter: self.settings.interpreter.clone(),
                entry_point: self.settings.entry_point.clone(),
                params,
            })
            .await?;
        let instance_id = started.handle.instance_id();
        self.registry.attach_sandbox(id, started.handle);
        tokio::spawn(observe(
            id.to_string(),
            instance_id,
            started.events,
            self.modules.clone(),
            self.teardown.clone(),
        ));

        *stage = LaunchStage::MountRoutes;
        self.registry.mount_routes(id, manifests.routes);

        *stage = LaunchStage::Running;
        match self.registry.mark_running(id) {
            None => Err(DappError::Conflict("Dapp launch cancelled".to_string())),
            Some(bound_default) => {
                if bound_default {
                    info!(dapp_id = %id, "Dapp bound to default route");
                }
                Ok(instance_id)
            }
        }
    }

    /// Link `<dapp>/public` into the served public tree when the bundle ships one.
    async fn link_public_assets(&self, id: &str, dapp_path: &Path) -> Result<(), DappError> {
        let source = dapp_path.join("public");
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Ok(());
        }
        let links = self.settings.public_dir.join("dapps");
        let link = links.join(id);
        if tokio::fs::symlink_metadata(&link).await.is_ok() {
            return Ok(());
        }
        let io = |e: std::io::Error| DappError::Io(format!("Failed to link public assets for {}: {}", id, e));
        tokio::fs::create_dir_all(&links).await.map_err(io)?;
        let source = tokio::fs::canonicalize(&source).await.map_err(io)?;
        #[cfg(unix)]
        tokio::fs::symlink(&source, &link).await.map_err(io)?;
        #[cfg(windows)]
        tokio::fs::symlink_dir(&source, &link).await.map_err(io)?;
        Ok(())
    }
}

async fn read_manifests(dapp_path: &Path, id: &str) -> Result<Manifests, DappError> {
    let config: DappManifestConfig = read_manifest(dapp_path, "config.json", id).await?;
    let schema: Value = read_manifest(dapp_path, "blockchain.json", id).await?;
    let entries: Vec<RouteEntry> = read_optional_manifest(dapp_path, "routes.json", id)
        .await?
        .unwrap_or_default();
    let routes = entries
        .into_iter()
        .filter_map(|entry| {
            RouteMethod::parse(&entry.method).map(|method| DappRoute {
                method,
                path: entry.path,
            })
        })
        .collect();
    Ok(Manifests { config, schema, routes })
}

/// Serve module calls until the sandbox goes away, then stop that instance.
async fn observe(
    id: String,
    instance_id: Uuid,
    mut events: mpsc::Receiver<SandboxEvent>,
    modules: Arc<ModuleTable>,
    teardown: Arc<Teardown>,
) {
    let reason = loop {
        match events.recv().await {
            Some(SandboxEvent::Call { mut call, reply }) => {
                call.application_id = id.clone();
                let modules = modules.clone();
                tokio::spawn(async move {
                    let _ = reply.send(modules.dispatch(call).await);
                });
            }
            Some(SandboxEvent::Exit { code }) => {
                info!(dapp_id = %id, code = ?code, "Dapp exited");
                break "exit";
            }
            Some(SandboxEvent::Error(message)) => {
                warn!(dapp_id = %id, error = %message, "Encountered error in dapp");
                break "error";
            }
            None => return,
        }
    };

    counter!("dapp_sandbox_exit_total", "reason" => reason).increment(1);
    if let Err(e) = teardown.stop(&id, Some(instance_id)).await {
        error!(dapp_id = %id, error = %e, "Encountered error while stopping dapp");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{write_bundle, MockRuntime};
    use super::*;
    use crate::domain::dapp::DappRecord;
    use crate::infrastructure::repositories::{
        InMemoryDappRepository, InMemoryPeerRegistry, InMemorySchemaProvisioner,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        orchestrator: LaunchOrchestrator,
        registry: Arc<DappRegistry>,
        runtime: Arc<MockRuntime>,
        peers: Arc<InMemoryPeerRegistry>,
        schema: Arc<InMemorySchemaProvisioner>,
        dir: TempDir,
    }

    async fn harness(runtime: MockRuntime) -> Harness {
        let dir = TempDir::new().unwrap();
        let dapps = Arc::new(InMemoryDappRepository::new());
        for id in ["d1", "d2"] {
            dapps
                .save(&DappRecord {
                    transaction_id: id.into(),
                    name: format!("app-{}", id),
                    description: None,
                    tags: None,
                    link: Some(format!("https://example.com/{}.zip", id)),
                    icon: None,
                    category: 0,
                    dapp_type: 0,
                    author_id: "1".into(),
                    block_id: None,
                    block_height: None,
                })
                .await
                .unwrap();
        }
        let registry = Arc::new(DappRegistry::new());
        let runtime = Arc::new(runtime);
        let peers = Arc::new(InMemoryPeerRegistry::new());
        let schema = Arc::new(InMemorySchemaProvisioner::new());
        let settings = LaunchSettings {
            dapps_dir: dir.path().join("dapps"),
            public_dir: dir.path().join("public"),
            interpreter: "node".into(),
            entry_point: "index.js".into(),
        };
        let event_bus = EventBus::new(16);
        let teardown = Arc::new(Teardown::new(
            registry.clone(),
            schema.clone(),
            settings.dapps_dir.clone(),
            settings.public_dir.clone(),
            event_bus.clone(),
        ));
        let orchestrator = LaunchOrchestrator::new(
            dapps,
            registry.clone(),
            runtime.clone(),
            peers.clone(),
            schema.clone(),
            Arc::new(ModuleTable::new()),
            teardown,
            settings,
            event_bus,
        );
        Harness {
            orchestrator,
            registry,
            runtime,
            peers,
            schema,
            dir,
        }
    }

    #[test]
    fn params_default_and_get_modules_suffix() {
        assert_eq!(launch_params(None), vec!["".to_string(), MODULES_PARAM.to_string()]);
        assert_eq!(launch_params(Some(vec![])), vec!["".to_string(), MODULES_PARAM.to_string()]);
        assert_eq!(
            launch_params(Some(vec!["--dev".into()])),
            vec!["--dev".to_string(), MODULES_PARAM.to_string()]
        );
    }

    #[tokio::test]
    async fn launches_installed_dapp() {
        let h = harness(MockRuntime::default()).await;
        write_bundle(&h.dir.path().join("dapps"), "d1");

        let instance = h.orchestrator.launch("d1", None).await.unwrap();

        assert_eq!(h.registry.phase("d1"), Some(DappPhase::Running));
        assert_eq!(h.registry.launched_ids(), vec!["d1".to_string()]);
        assert_eq!(h.registry.default_route().as_deref(), Some("d1"));
        assert!(h.registry.resolve_route("d1", RouteMethod::Post, "/items/7").is_some());
        assert_eq!(h.peers.peers("d1").len(), 1);
        assert!(h.schema.has_tables("d1"));
        assert!(h.dir.path().join("public/dapps/d1").exists());

        let started = h.runtime.started.lock();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].params, vec!["".to_string(), MODULES_PARAM.to_string()]);
        assert_eq!(h.runtime.handles.lock()[0].instance, instance);
    }

    #[tokio::test]
    async fn second_launch_is_rejected_without_side_effects() {
        let h = harness(MockRuntime::default()).await;
        write_bundle(&h.dir.path().join("dapps"), "d1");
        h.orchestrator.launch("d1", None).await.unwrap();

        let err = h.orchestrator.launch("d1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Dapp already launched");
        assert_eq!(h.runtime.started.lock().len(), 1);
    }

    #[tokio::test]
    async fn launch_before_install_starts_nothing() {
        let h = harness(MockRuntime::default()).await;
        let err = h.orchestrator.launch("d1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Dapp not installed");
        assert!(h.runtime.started.lock().is_empty());
        assert_eq!(h.registry.phase("d1"), Some(DappPhase::Failed));
        assert!(h.registry.launched_ids().is_empty());
    }

    #[tokio::test]
    async fn missing_manifest_names_the_file() {
        let h = harness(MockRuntime::default()).await;
        let path = write_bundle(&h.dir.path().join("dapps"), "d1");
        std::fs::write(path.join("routes.json"), "not json").unwrap();

        let err = h.orchestrator.launch("d1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to read routes.json file for: d1");
        assert!(h.runtime.started.lock().is_empty());
    }

    #[tokio::test]
    async fn bundle_without_routes_launches_unrouted() {
        let h = harness(MockRuntime::default()).await;
        let path = write_bundle(&h.dir.path().join("dapps"), "d1");
        std::fs::remove_file(path.join("routes.json")).unwrap();

        h.orchestrator.launch("d1", None).await.unwrap();
        assert_eq!(h.runtime.started.lock().len(), 1);
        assert_eq!(h.registry.launched_ids(), vec!["d1".to_string()]);
        assert!(h.registry.resolve_route("d1", RouteMethod::Get, "/hello").is_none());
    }

    #[tokio::test]
    async fn spawn_failure_clears_launched_state() {
        let h = harness(MockRuntime {
            fail: true,
            ..Default::default()
        })
        .await;
        write_bundle(&h.dir.path().join("dapps"), "d1");

        let err = h.orchestrator.launch("d1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to start sandbox: interpreter missing");
        assert!(h.registry.launched_ids().is_empty());
        assert!(h.registry.sandbox_ids().is_empty());
        assert_eq!(h.registry.default_route(), None);
    }

    #[tokio::test]
    async fn sandbox_exit_stops_that_instance() {
        let h = harness(MockRuntime::default()).await;
        let dapps_dir = h.dir.path().join("dapps");
        write_bundle(&dapps_dir, "d1");
        write_bundle(&dapps_dir, "d2");
        h.orchestrator.launch("d1", None).await.unwrap();
        h.orchestrator.launch("d2", None).await.unwrap();

        let sender = h.runtime.senders.lock()[0].clone();
        sender.send(SandboxEvent::Exit { code: Some(1) }).await.unwrap();

        for _ in 0..50 {
            if h.registry.launched_ids() == vec!["d2".to_string()] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.registry.launched_ids(), vec!["d2".to_string()]);
        assert_eq!(h.runtime.handles.lock()[0].stops.load(Ordering::SeqCst), 1);
        assert_eq!(h.runtime.handles.lock()[1].stops.load(Ordering::SeqCst), 0);
        assert_eq!(h.registry.default_route().as_deref(), Some("d1"));
    }
}
