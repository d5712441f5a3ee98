// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Install Pipeline
//!
//! `Requested → DirectoryReserved → Downloading → Extracting → Installed`.
//!
//! The per-id phase in [`DappRegistry`] is claimed up front and released by a
//! scope guard, so a cancelled install never leaves the id stuck in
//! `Installing`. Anything that fails after the install directory exists
//! removes that directory before reporting.

use chrono::Utc;
use metrics::counter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::application::registry::DappRegistry;
use crate::domain::dapp::{DappError, DappRecord};
use crate::domain::events::DappEvent;
use crate::domain::lifecycle::InstallStage;
use crate::domain::repository::DappRepository;
use crate::infrastructure::archive::extract_bundle;
use crate::infrastructure::downloader::BundleDownloader;
use crate::infrastructure::event_bus::EventBus;

/// Directories installed under `dapps_dir`, minus installs still in flight.
pub async fn installed_ids(dapps_dir: &Path, registry: &DappRegistry) -> Result<Vec<String>, DappError> {
    let mut entries = match tokio::fs::read_dir(dapps_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(DappError::Io(format!(
                "Failed to list {}: {}",
                dapps_dir.display(),
                e
            )))
        }
    };
    let in_flight = registry.installing_ids();
    let mut ids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DappError::Io(e.to_string()))?
    {
        let Ok(id) = entry.file_name().into_string() else {
            continue;
        };
        if !in_flight.contains(&id) {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

pub struct InstallPipeline {
    dapps: Arc<dyn DappRepository>,
    registry: Arc<DappRegistry>,
    downloader: BundleDownloader,
    dapps_dir: PathBuf,
    tmp_dir: PathBuf,
    event_bus: EventBus,
}

impl InstallPipeline {
    pub fn new(
        dapps: Arc<dyn DappRepository>,
        registry: Arc<DappRegistry>,
        downloader: BundleDownloader,
        dapps_dir: PathBuf,
        tmp_dir: PathBuf,
        event_bus: EventBus,
    ) -> Self {
        Self {
            dapps,
            registry,
            downloader,
            dapps_dir,
            tmp_dir,
            event_bus,
        }
    }

    /// Install the confirmed registration `id`, returning its directory.
    pub async fn install(&self, id: &str) -> Result<PathBuf, DappError> {
        let record = self
            .dapps
            .find_by_id(id)
            .await?
            .ok_or_else(|| DappError::NotFound("DApp not found".to_string()))?;

        if installed_ids(&self.dapps_dir, &self.registry)
            .await?
            .iter()
            .any(|installed| installed == id)
        {
            return Err(DappError::Conflict("This dapp already installed".to_string()));
        }

        self.registry.begin_install(id)?;
        let mut installed = scopeguard::guard(false, |installed| {
            self.registry.finish_install(id, installed);
        });

        let dapp_path = self.dapps_dir.join(id);
        match self.run(&record, &dapp_path).await {
            Ok(()) => {
                *installed = true;
                counter!("dapp_install_total", "outcome" => "success").increment(1);
                info!(dapp_id = %id, path = %dapp_path.display(), "Dapp installed");
                self.event_bus.publish_dapp_event(DappEvent::Installed {
                    dapp_id: id.to_string(),
                    installed_at: Utc::now(),
                });
                Ok(dapp_path)
            }
            Err((stage, cause)) => {
                counter!("dapp_install_total", "outcome" => "failure").increment(1);
                error!(dapp_id = %id, stage = %stage, error = %cause, "Dapp installation failed");
                self.event_bus.publish_dapp_event(DappEvent::InstallFailed {
                    dapp_id: id.to_string(),
                    reason: cause.clone(),
                    failed_at: Utc::now(),
                });
                Err(DappError::InstallFailed {
                    id: id.to_string(),
                    cause,
                })
            }
        }
    }

    async fn run(&self, record: &DappRecord, dapp_path: &Path) -> Result<(), (InstallStage, String)> {
        let id = record.transaction_id.as_str();
        let archive = self.tmp_dir.join(format!("{}.zip", id));

        let mut stage = InstallStage::DirectoryReserved;
        tokio::fs::create_dir_all(&self.dapps_dir)
            .await
            .map_err(|e| (stage, e.to_string()))?;
        tokio::fs::create_dir(dapp_path)
            .await
            .map_err(|e| (stage, e.to_string()))?;

        let result = async {
            stage = InstallStage::Downloading;
            let link = record
                .link
                .as_deref()
                .ok_or_else(|| "Invalid dapp link".to_string())?;
            tokio::fs::create_dir_all(&self.tmp_dir)
                .await
                .map_err(|e| e.to_string())?;
            self.downloader
                .download(link, &archive)
                .await
                .map_err(|e| e.to_string())?;

            stage = InstallStage::Extracting;
            let extracted = extract_bundle(&archive, dapp_path).await;
            remove_quietly(&archive).await;
            extracted.map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        }
        .await;

        if let Err(cause) = result {
            if let Err(e) = tokio::fs::remove_dir_all(dapp_path).await {
                warn!(dapp_id = %id, error = %e, "Failed to remove partial install directory");
            }
            return Err((stage, cause));
        }
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary bundle");
        }
    }
}
