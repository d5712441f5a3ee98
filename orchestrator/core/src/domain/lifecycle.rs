// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dapp Lifecycle State Machine
//!
//! ```text
//! Installing ──► Installed ──► Launching ──► Running ──► Stopping ──► Stopped
//!     │                           │                                    │
//!     ▼                           ▼                                    ▼
//!   Failed                      Failed                        (launch again)
//!
//! Installed / Stopped / Failed ──► Removing ──► (gone)
//! ```
//!
//! The phase of each dapp lives in `DappRegistry`; install and launch progress
//! through explicit stages so a failure names the step that broke.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DappPhase {
    Installing,
    Installed,
    Launching,
    Running,
    Stopping,
    Stopped,
    Removing,
    Failed,
}

impl DappPhase {
    /// Download or uninstall is in progress.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Installing | Self::Removing)
    }

    /// A sandbox exists or is being brought up.
    pub fn is_launched(self) -> bool {
        matches!(self, Self::Launching | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Requested,
    DirectoryReserved,
    Downloading,
    Extracting,
    Installed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStage {
    LoadRecord,
    CheckInstalled,
    LinkPublicAssets,
    ReadManifests,
    RegisterPeers,
    ProvisionTables,
    StartSandbox,
    MountRoutes,
    Running,
}

impl LaunchStage {
    /// Failures from this stage on must tear the sandbox down.
    pub fn requires_stop(self) -> bool {
        matches!(self, Self::StartSandbox | Self::MountRoutes | Self::Running)
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for LaunchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
