// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dapp Service
//!
//! Entry point of the dapp host. Owns the [`DappRegistry`] and wires the
//! install pipeline, launch orchestrator, teardown, sandbox bridge, shared
//! API and ledger fan-out around it. The HTTP layer and the daemon only
//! talk to this type.
//!
//! ## Master password
//!
//! When `master_password` is configured, install, uninstall, launch and stop
//! require it; a mismatch is [`DappError::Unauthorized`].

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::asset_types::{AssetTypeRegistry, LedgerContext};
use crate::application::bridge::SandboxBridge;
use crate::application::fanout::LedgerFanout;
use crate::application::install::{installed_ids, InstallPipeline};
use crate::application::launch::{LaunchOrchestrator, LaunchSettings};
use crate::application::orders::{parse_params, DepositRequest};
use crate::application::registry::{DappRegistry, DappRoute, RouteMethod};
use crate::application::shared_api::{module_table, DappsSandboxApi, UiaSandboxApi};
use crate::application::teardown::Teardown;
use crate::domain::dapp::{DappCategory, DappError, DappListFilter, DappQuery, DappRecord};
use crate::domain::node_config::DappsConfig;
use crate::domain::repository::{
    AccountLedger, AssetRepository, DappRepository, PeerRegistry, SchemaProvisioner,
    TransactionSubmitter, TransferRepository,
};
use crate::domain::reservation::ReservationIndex;
use crate::domain::sandbox::{DappNotifier, SandboxError, SandboxRuntime};
use crate::domain::transaction::Block;
use crate::domain::uia::BalanceCache;
use crate::infrastructure::downloader::BundleDownloader;
use crate::infrastructure::event_bus::EventBus;

/// External collaborators the service is built from.
#[derive(Clone)]
pub struct DappServiceDeps {
    pub dapps: Arc<dyn DappRepository>,
    pub transfers: Arc<dyn TransferRepository>,
    pub assets: Arc<dyn AssetRepository>,
    pub accounts: Arc<dyn AccountLedger>,
    pub peers: Arc<dyn PeerRegistry>,
    pub schema: Arc<dyn SchemaProvisioner>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub runtime: Arc<dyn SandboxRuntime>,
    pub event_bus: EventBus,
}

pub struct DappService {
    config: DappsConfig,
    dapps: Arc<dyn DappRepository>,
    submitter: Arc<dyn TransactionSubmitter>,
    registry: Arc<DappRegistry>,
    bridge: Arc<SandboxBridge>,
    install: InstallPipeline,
    launch: LaunchOrchestrator,
    teardown: Arc<Teardown>,
    fanout: LedgerFanout,
    asset_types: AssetTypeRegistry,
    event_bus: EventBus,
}

impl DappService {
    /// Build the service and prepare its directories: the served
    /// `<public_dir>/dapps` tree is emptied, the install and temp
    /// directories are created.
    pub async fn new(config: DappsConfig, deps: DappServiceDeps) -> Result<Self, DappError> {
        let dapps_dir = config.dapps_dir();
        let public_links = config.public_dir.join("dapps");
        prepare_directories(&dapps_dir, &config.tmp_dir, &public_links).await?;

        let registry = Arc::new(DappRegistry::new());
        let bridge = Arc::new(SandboxBridge::new(registry.clone()));
        let teardown = Arc::new(Teardown::new(
            registry.clone(),
            deps.schema.clone(),
            dapps_dir.clone(),
            config.public_dir.clone(),
            deps.event_bus.clone(),
        ));

        let balances = Arc::new(BalanceCache::new());
        let modules = module_table(
            Arc::new(DappsSandboxApi::new(
                deps.dapps.clone(),
                deps.transfers.clone(),
                deps.accounts.clone(),
                registry.clone(),
                deps.submitter.clone(),
            )),
            Arc::new(UiaSandboxApi::new(deps.assets.clone(), balances.clone())),
        );

        let downloader = BundleDownloader::new(Duration::from_secs(config.download_timeout_seconds))
            .map_err(|e| DappError::Io(e.to_string()))?;
        let install = InstallPipeline::new(
            deps.dapps.clone(),
            registry.clone(),
            downloader,
            dapps_dir.clone(),
            config.tmp_dir.clone(),
            deps.event_bus.clone(),
        );
        let launch = LaunchOrchestrator::new(
            deps.dapps.clone(),
            registry.clone(),
            deps.runtime.clone(),
            deps.peers.clone(),
            deps.schema.clone(),
            Arc::new(modules),
            teardown.clone(),
            LaunchSettings {
                dapps_dir,
                public_dir: config.public_dir.clone(),
                interpreter: config.interpreter.clone(),
                entry_point: config.entry_point.clone(),
            },
            deps.event_bus.clone(),
        );

        let notifier: Arc<dyn DappNotifier> = bridge.clone();
        let fanout = LedgerFanout::new(registry.clone(), notifier.clone());
        let asset_types = AssetTypeRegistry::with_defaults(LedgerContext {
            dapps: deps.dapps.clone(),
            transfers: deps.transfers.clone(),
            assets: deps.assets.clone(),
            accounts: deps.accounts.clone(),
            reservations: Arc::new(ReservationIndex::new()),
            balances,
            notifier,
            event_bus: deps.event_bus.clone(),
        });

        info!(
            dapps_dir = %config.dapps_dir().display(),
            master_password = config.master_password.is_some(),
            "Dapp service ready"
        );

        Ok(Self {
            config,
            dapps: deps.dapps,
            submitter: deps.submitter,
            registry,
            bridge,
            install,
            launch,
            teardown,
            fanout,
            asset_types,
            event_bus: deps.event_bus,
        })
    }

    pub fn is_master_password_enabled(&self) -> bool {
        self.config.master_password.is_some()
    }

    fn authorize(&self, master: Option<&str>) -> Result<(), DappError> {
        match &self.config.master_password {
            Some(expected) if master != Some(expected.as_str()) => Err(DappError::Unauthorized),
            _ => Ok(()),
        }
    }

    pub async fn install(&self, id: &str, master: Option<&str>) -> Result<PathBuf, DappError> {
        self.authorize(master)?;
        self.install.install(id).await
    }

    pub async fn uninstall(&self, id: &str, master: Option<&str>) -> Result<(), DappError> {
        self.authorize(master)?;
        self.get(id).await?;
        self.teardown.uninstall(id).await
    }

    pub async fn launch(
        &self,
        id: &str,
        params: Option<Vec<String>>,
        master: Option<&str>,
    ) -> Result<Uuid, DappError> {
        self.authorize(master)?;
        self.launch.launch(id, params).await
    }

    /// Stop `id`. Stopping a dapp that is not running returns `Ok(false)`.
    pub async fn stop(&self, id: &str, master: Option<&str>) -> Result<bool, DappError> {
        self.authorize(master)?;
        self.teardown.stop(id, None).await
    }

    pub async fn installed_ids(&self) -> Result<Vec<String>, DappError> {
        installed_ids(&self.config.dapps_dir(), &self.registry).await
    }

    pub fn installing_ids(&self) -> Vec<String> {
        self.registry.installing_ids()
    }

    pub fn removing_ids(&self) -> Vec<String> {
        self.registry.removing_ids()
    }

    pub fn launched_ids(&self) -> Vec<String> {
        self.registry.launched_ids()
    }

    /// Registry records of every installed dapp.
    pub async fn installed(&self) -> Result<Vec<DappRecord>, DappError> {
        let ids = self.installed_ids().await?;
        Ok(self.dapps.find_by_ids(&ids).await?)
    }

    pub fn categories(&self) -> serde_json::Map<String, Value> {
        DappCategory::table()
    }

    pub async fn get(&self, id: &str) -> Result<DappRecord, DappError> {
        self.dapps
            .find_by_id(id)
            .await?
            .ok_or_else(|| DappError::NotFound("DApp not found".to_string()))
    }

    pub async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<DappRecord>, DappError> {
        Ok(self.dapps.find_by_ids(ids).await?)
    }

    pub async fn count(&self) -> Result<usize, DappError> {
        Ok(self.dapps.count().await?)
    }

    pub async fn list(&self, filter: DappListFilter) -> Result<Vec<DappRecord>, DappError> {
        let query = DappQuery::try_from(filter)?;
        Ok(self.dapps.list(&query).await?)
    }

    /// Validate a deposit body and hand it to the submitter. Returns the
    /// admitted transaction id.
    pub async fn deposit(&self, body: Value) -> Result<String, DappError> {
        let order = parse_params::<DepositRequest>(body)
            .and_then(DepositRequest::into_order)
            .map_err(DappError::Validation)?;
        self.submitter
            .submit(order)
            .await
            .map_err(|e| DappError::Validation(e.to_string()))
    }

    /// Launch every installed dapp with its configured parameters.
    pub async fn on_blockchain_ready(&self) {
        let ids = match self.installed_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to get installed ids");
                return;
            }
        };
        info!(count = ids.len(), "Launching installed dapps");
        for id in ids {
            let params = self.config.params.get(&id).cloned();
            match self.launch.launch(&id, params).await {
                Ok(_) => info!(dapp_id = %id, "Launched dapp successfully"),
                Err(e) => error!(dapp_id = %id, error = %e, "Failed to launch dapp"),
            }
        }
    }

    /// Stop every launched dapp.
    pub async fn cleanup(&self) {
        let mut failed = false;
        for id in self.registry.launched_ids() {
            if let Err(e) = self.teardown.stop(&id, None).await {
                warn!(dapp_id = %id, error = %e, "Failed to stop dapp");
                failed = true;
            }
        }
        if failed {
            error!("All dapps stopped with errors");
        } else {
            info!("All dapps stopped successfully");
        }
    }

    pub fn on_new_block(&self, block: &Block, broadcast: bool) -> Vec<JoinHandle<()>> {
        self.fanout.on_new_block(block, broadcast)
    }

    pub fn on_delete_blocks_before(&self, block: &Block) -> Vec<JoinHandle<()>> {
        self.fanout.on_delete_blocks_before(block)
    }

    pub async fn request(
        &self,
        id: &str,
        method: &str,
        path: &str,
        query: Value,
    ) -> Result<Value, SandboxError> {
        self.bridge.request(id, method, path, query).await
    }

    pub fn resolve_route(&self, prefix: &str, method: RouteMethod, path: &str) -> Option<(String, DappRoute)> {
        self.registry.resolve_route(prefix, method, path)
    }

    pub fn notifier(&self) -> Arc<dyn DappNotifier> {
        self.bridge.clone()
    }

    /// Handlers the ledger dispatches dapp and issued-asset transactions to.
    pub fn asset_types(&self) -> &AssetTypeRegistry {
        &self.asset_types
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn registry(&self) -> &Arc<DappRegistry> {
        &self.registry
    }
}

async fn prepare_directories(dapps_dir: &Path, tmp_dir: &Path, public_links: &Path) -> Result<(), DappError> {
    let io = |path: &Path, e: std::io::Error| DappError::Io(format!("Failed to prepare {}: {}", path.display(), e));
    match tokio::fs::remove_dir_all(public_links).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(io(public_links, e)),
        _ => {}
    }
    for dir in [dapps_dir, tmp_dir, public_links] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| io(dir, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::launch::test_support::{write_bundle, MockRuntime};
    use crate::domain::transaction::{Asset, TransactionType};
    use crate::infrastructure::repositories::{
        InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository,
        InMemoryPeerRegistry, InMemorySchemaProvisioner, InMemoryTransferRepository,
        RecordingTransactionSubmitter,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Harness {
        service: DappService,
        submitter: Arc<RecordingTransactionSubmitter>,
        runtime: Arc<MockRuntime>,
        dir: TempDir,
    }

    fn record(id: &str, name: &str) -> DappRecord {
        DappRecord {
            transaction_id: id.into(),
            name: name.into(),
            description: None,
            tags: None,
            link: Some(format!("https://example.com/{}.zip", id)),
            icon: None,
            category: 1,
            dapp_type: 0,
            author_id: "1".into(),
            block_id: None,
            block_height: None,
        }
    }

    async fn harness(master_password: Option<&str>, params: HashMap<String, Vec<String>>) -> Harness {
        let dir = TempDir::new().unwrap();
        let config = DappsConfig {
            base_dir: dir.path().to_path_buf(),
            public_dir: dir.path().join("public"),
            tmp_dir: dir.path().join("tmp"),
            master_password: master_password.map(str::to_string),
            params,
            ..DappsConfig::default()
        };
        let dapps = Arc::new(InMemoryDappRepository::new());
        dapps.save(&record("d1", "One")).await.unwrap();
        dapps.save(&record("d2", "Two")).await.unwrap();
        let submitter = Arc::new(RecordingTransactionSubmitter::new());
        let runtime = Arc::new(MockRuntime::default());
        let deps = DappServiceDeps {
            dapps,
            transfers: Arc::new(InMemoryTransferRepository::new()),
            assets: Arc::new(InMemoryAssetRepository::new()),
            accounts: Arc::new(InMemoryAccountLedger::new()),
            peers: Arc::new(InMemoryPeerRegistry::new()),
            schema: Arc::new(InMemorySchemaProvisioner::new()),
            submitter: submitter.clone(),
            runtime: runtime.clone(),
            event_bus: EventBus::new(64),
        };
        let service = DappService::new(config, deps).await.unwrap();
        Harness {
            service,
            submitter,
            runtime,
            dir,
        }
    }

    #[tokio::test]
    async fn startup_prepares_directories_and_clears_public_links() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("public/dapps/old");
        std::fs::create_dir_all(&stale).unwrap();
        let config = DappsConfig {
            base_dir: dir.path().to_path_buf(),
            public_dir: dir.path().join("public"),
            tmp_dir: dir.path().join("tmp"),
            ..DappsConfig::default()
        };
        prepare_directories(&config.dapps_dir(), &config.tmp_dir, &config.public_dir.join("dapps"))
            .await
            .unwrap();
        assert!(!stale.exists());
        assert!(dir.path().join("public/dapps").is_dir());
        assert!(dir.path().join("dapps").is_dir());
        assert!(dir.path().join("tmp").is_dir());
    }

    #[tokio::test]
    async fn master_password_gates_lifecycle_operations() {
        let h = harness(Some("letmein"), HashMap::new()).await;
        assert!(h.service.is_master_password_enabled());

        let err = h.service.stop("d1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid master password");
        let err = h.service.launch("d1", None, Some("wrong")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid master password");
        assert!(!h.service.stop("d1", Some("letmein")).await.unwrap());
    }

    #[tokio::test]
    async fn blockchain_ready_launches_installed_with_configured_params() {
        let params = HashMap::from([("d1".to_string(), vec!["--peer".to_string()])]);
        let h = harness(None, params).await;
        let dapps_dir = h.dir.path().join("dapps");
        write_bundle(&dapps_dir, "d1");
        write_bundle(&dapps_dir, "d2");

        h.service.on_blockchain_ready().await;
        assert_eq!(h.service.launched_ids(), vec!["d1".to_string(), "d2".to_string()]);
        let started = h.runtime.started.lock().clone();
        let d1 = started.iter().find(|s| s.application_id == "d1").unwrap();
        assert_eq!(d1.params, vec!["--peer".to_string(), "modules.full.json".to_string()]);

        let installed = h.service.installed().await.unwrap();
        assert_eq!(installed.len(), 2);

        h.service.cleanup().await;
        assert!(h.service.launched_ids().is_empty());
        assert!(h.runtime.handles.lock().iter().all(|handle| {
            handle.stops.load(std::sync::atomic::Ordering::SeqCst) == 1
        }));
    }

    #[tokio::test]
    async fn uninstall_of_unknown_dapp_is_not_found() {
        let h = harness(None, HashMap::new()).await;
        let err = h.service.uninstall("nope", None).await.unwrap_err();
        assert_eq!(err.to_string(), "DApp not found");
    }

    #[tokio::test]
    async fn registry_queries() {
        let h = harness(None, HashMap::new()).await;
        assert_eq!(h.service.count().await.unwrap(), 2);
        assert_eq!(h.service.get("d2").await.unwrap().name, "Two");
        assert_eq!(h.service.get("d9").await.unwrap_err().to_string(), "DApp not found");

        let listed = h
            .service
            .list(DappListFilter {
                category: Some("Business".into()),
                order_by: Some("name:asc".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two"]);

        let err = h
            .service
            .list(DappListFilter {
                category: Some("Music".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid dapp category");
        assert_eq!(h.service.categories()["Games"], 8);
    }

    #[tokio::test]
    async fn deposit_submits_in_transfer() {
        let h = harness(None, HashMap::new()).await;
        let id = h
            .service
            .deposit(json!({"secret": "s", "amount": 100, "dappId": "d1"}))
            .await
            .unwrap();
        let orders = h.submitter.orders();
        assert_eq!(orders[0].0, id);
        assert_eq!(orders[0].1.tx_type, TransactionType::InTransfer);
        assert_eq!(orders[0].1.asset, Asset::InTransfer { dapp_id: "d1".into() });

        assert!(h.service.deposit(json!({"amount": 100})).await.is_err());
    }

    #[tokio::test]
    async fn ledger_handlers_are_wired() {
        let h = harness(None, HashMap::new()).await;
        assert!(h.service.asset_types().get(TransactionType::Dapp).is_some());
        assert!(h.service.asset_types().get(TransactionType::UiaTransfer).is_some());
    }
}
