// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server
//!
//! Builds the [`DappService`] from the node configuration, launches the
//! installed dapps and serves the dapp API until a shutdown signal arrives.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use aegis_dapps_core::application::{DappService, DappServiceDeps};
use aegis_dapps_core::domain::node_config::NodeConfigManifest;
use aegis_dapps_core::infrastructure::event_bus::EventBus;
use aegis_dapps_core::infrastructure::repositories::{
    InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository, InMemoryPeerRegistry,
    InMemorySchemaProvisioner, InMemoryTransferRepository, RecordingTransactionSubmitter,
};
use aegis_dapps_core::infrastructure::ProcessSandboxRuntime;
use aegis_dapps_core::presentation::api;

/// Overrides given on the command line take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Wire the service over standalone adapters.
pub async fn build_service(config: &NodeConfigManifest) -> Result<Arc<DappService>> {
    let deps = DappServiceDeps {
        dapps: Arc::new(InMemoryDappRepository::new()),
        transfers: Arc::new(InMemoryTransferRepository::new()),
        assets: Arc::new(InMemoryAssetRepository::new()),
        accounts: Arc::new(InMemoryAccountLedger::new()),
        peers: Arc::new(InMemoryPeerRegistry::new()),
        schema: Arc::new(InMemorySchemaProvisioner::new()),
        submitter: Arc::new(RecordingTransactionSubmitter::new()),
        runtime: Arc::new(ProcessSandboxRuntime::new()),
        event_bus: EventBus::with_default_capacity(),
    };
    let service = DappService::new(config.spec.dapps.clone(), deps)
        .await
        .context("Failed to initialize dapp service")?;
    Ok(Arc::new(service))
}

pub async fn start_daemon(options: ServeOptions) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(options.config)
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let network = config.network();
    let host = options.host.unwrap_or(network.bind_address);
    let port = options.port.unwrap_or(network.port);

    let service = build_service(&config).await?;

    let launcher = service.clone();
    tokio::spawn(async move {
        launcher.on_blockchain_ready().await;
    });

    let app = api::app(service.clone());
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(node = %config.metadata.name, address = %addr, "Dapp API listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.cleanup().await;
    if let Err(e) = &served {
        error!(error = %e, "Server error");
    }
    served.context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
