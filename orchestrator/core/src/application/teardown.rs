// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stop and uninstall.

use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::launch::read_manifest;
use crate::application::registry::DappRegistry;
use crate::domain::dapp::DappError;
use crate::domain::events::DappEvent;
use crate::domain::repository::SchemaProvisioner;
use crate::infrastructure::event_bus::EventBus;

pub struct Teardown {
    registry: Arc<DappRegistry>,
    schema: Arc<dyn SchemaProvisioner>,
    dapps_dir: PathBuf,
    public_dir: PathBuf,
    event_bus: EventBus,
}

impl Teardown {
    pub fn new(
        registry: Arc<DappRegistry>,
        schema: Arc<dyn SchemaProvisioner>,
        dapps_dir: PathBuf,
        public_dir: PathBuf,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            schema,
            dapps_dir,
            public_dir,
            event_bus,
        }
    }

    /// Stop the sandbox of `id`, dropping its routes and readiness.
    ///
    /// With `instance` set only that process is stopped, so an exit observer
    /// of a replaced sandbox cannot take down its successor. Returns `false`
    /// when nothing was running.
    pub async fn stop(&self, id: &str, instance: Option<Uuid>) -> Result<bool, DappError> {
        let Some(handle) = self.registry.detach(id, instance) else {
            return Ok(false);
        };
        let _stopping = scopeguard::guard((), |_| self.registry.finish_stop(id));
        let instance_id = handle.instance_id();
        handle.stop().await?;

        info!(dapp_id = %id, instance_id = %instance_id, "Dapp stopped");
        self.event_bus.publish_dapp_event(DappEvent::Stopped {
            dapp_id: id.to_string(),
            instance_id,
            stopped_at: Utc::now(),
        });
        Ok(true)
    }

    /// Stop if launched, drop provisioned tables and remove the install
    /// directory. The directory goes even when dropping tables fails; errors
    /// of both steps are reported together.
    pub async fn uninstall(&self, id: &str) -> Result<(), DappError> {
        if self.registry.phase(id).is_some_and(|p| p.is_busy()) {
            return Err(DappError::Conflict(
                "This DApp already on uninstall/loading".to_string(),
            ));
        }
        let dapp_path = self.dapps_dir.join(id);
        if !tokio::fs::try_exists(&dapp_path).await.unwrap_or(false) {
            return Err(DappError::NotFound("Dapp not found".to_string()));
        }

        self.registry.begin_removal(id)?;
        let _removal = scopeguard::guard((), |_| self.registry.finish_removal(id));

        let mut errors = Vec::new();
        if let Err(e) = self.stop(id, None).await {
            warn!(dapp_id = %id, error = %e, "Failed to stop dapp before uninstall");
            errors.push(e.to_string());
        }

        match read_manifest::<Value>(&dapp_path, "blockchain.json", id).await {
            Ok(schema) => {
                if let Err(e) = self.schema.drop_tables(id, &schema).await {
                    errors.push(e.to_string());
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        if let Err(e) = tokio::fs::remove_dir_all(&dapp_path).await {
            errors.push(format!("Failed to remove {}: {}", dapp_path.display(), e));
        }
        self.unlink_public(id).await;

        if !errors.is_empty() {
            warn!(dapp_id = %id, errors = ?errors, "Dapp uninstalled with errors");
            return Err(DappError::Teardown(errors));
        }

        info!(dapp_id = %id, "Dapp uninstalled");
        self.event_bus.publish_dapp_event(DappEvent::Uninstalled {
            dapp_id: id.to_string(),
            uninstalled_at: Utc::now(),
        });
        Ok(())
    }

    async fn unlink_public(&self, id: &str) {
        let link = self.public_dir.join("dapps").join(id);
        if let Err(e) = tokio::fs::remove_file(&link).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dapp_id = %id, path = %link.display(), error = %e, "Failed to remove public link");
            }
        }
    }
}
