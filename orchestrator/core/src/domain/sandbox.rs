// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sandbox Runtime Seam
//!
//! A dapp runs as an isolated child process. The orchestrator only sees it
//! through [`SandboxRuntime`] (start) and [`SandboxHandle`] (request, stop);
//! everything the child initiates arrives on the [`SandboxEvent`] channel
//! returned by `start`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Request forwarded into a running dapp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: serde_json::Value,
}

impl SandboxRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, query: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query,
        }
    }
}

/// Ledger notifications pushed to dapps via `POST /message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "message", rename_all = "lowercase")]
pub enum SandboxNotification {
    Point {
        id: String,
        height: u64,
    },
    #[serde(rename_all = "camelCase")]
    Rollback {
        point_id: String,
        point_height: u64,
    },
    #[serde(rename_all = "camelCase")]
    Withdrawal { transaction_id: String },
}

impl SandboxNotification {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Point { .. } => "point",
            Self::Rollback { .. } => "rollback",
            Self::Withdrawal { .. } => "withdrawal",
        }
    }
}

/// A `"<module>#<call>"` invocation issued by a dapp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxCall {
    pub call: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub application_id: String,
}

/// Everything needed to start one sandbox process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub application_id: String,
    pub instance_id: Uuid,
    pub working_dir: PathBuf,
    pub interpreter: String,
    pub entry_point: String,
    pub params: Vec<String>,
}

/// Events emitted by a running sandbox.
#[derive(Debug)]
pub enum SandboxEvent {
    Call {
        call: SandboxCall,
        reply: oneshot::Sender<Result<serde_json::Value, String>>,
    },
    Exit {
        code: Option<i32>,
    },
    Error(String),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Dapp not found")]
    NotFound,
    #[error("Dapp not ready")]
    NotReady,
    #[error("Failed to start sandbox: {0}")]
    SpawnFailed(String),
    #[error("Sandbox channel error: {0}")]
    Channel(String),
    #[error("{0}")]
    Remote(String),
    #[error("Sandbox terminated")]
    Terminated,
}

/// Handle to a started sandbox.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    fn instance_id(&self) -> Uuid;

    /// Forward a request and await the dapp's reply. No implicit timeout.
    async fn request(&self, request: SandboxRequest) -> Result<serde_json::Value, SandboxError>;

    /// Terminate the process. Stopping an exited sandbox is not an error.
    async fn stop(&self) -> Result<(), SandboxError>;
}

pub struct StartedSandbox {
    pub handle: Arc<dyn SandboxHandle>,
    pub events: mpsc::Receiver<SandboxEvent>,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn start(&self, spec: LaunchSpec) -> Result<StartedSandbox, SandboxError>;
}

/// Delivery of ledger notifications to a running dapp.
#[async_trait]
pub trait DappNotifier: Send + Sync {
    async fn notify(
        &self,
        dapp_id: &str,
        notification: SandboxNotification,
    ) -> Result<serde_json::Value, SandboxError>;
}
