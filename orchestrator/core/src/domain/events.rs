// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dapp lifecycle events. Every variant is also a `dapps/change`
/// notification for clients that only care that the registry moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DappEvent {
    Registered {
        dapp_id: String,
        name: String,
        registered_at: DateTime<Utc>,
    },
    Installed {
        dapp_id: String,
        installed_at: DateTime<Utc>,
    },
    InstallFailed {
        dapp_id: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    Launched {
        dapp_id: String,
        instance_id: Uuid,
        launched_at: DateTime<Utc>,
    },
    Stopped {
        dapp_id: String,
        instance_id: Uuid,
        stopped_at: DateTime<Utc>,
    },
    Uninstalled {
        dapp_id: String,
        uninstalled_at: DateTime<Utc>,
    },
}

impl DappEvent {
    pub const CHANGE_TOPIC: &'static str = "dapps/change";

    pub fn dapp_id(&self) -> &str {
        match self {
            Self::Registered { dapp_id, .. }
            | Self::Installed { dapp_id, .. }
            | Self::InstallFailed { dapp_id, .. }
            | Self::Launched { dapp_id, .. }
            | Self::Stopped { dapp_id, .. }
            | Self::Uninstalled { dapp_id, .. } => dapp_id,
        }
    }
}
