// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sandbox Message Bridge
//!
//! Two directions:
//!
//! - **Node → dapp.** [`SandboxBridge::request`] forwards a call into a ready
//!   sandbox; [`SandboxBridge::message`] is the `POST /message` shorthand used
//!   for ledger notifications.
//! - **Dapp → node.** `"<module>#<call>"` invocations are resolved through a
//!   [`ModuleTable`], a fixed map from module name to an optional
//!   [`SandboxApi`]. Modules without an API are known but refuse calls.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::application::registry::DappRegistry;
use crate::domain::sandbox::{
    DappNotifier, SandboxCall, SandboxError, SandboxNotification, SandboxRequest,
};

/// Arguments handed to a sandbox API method.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxArgs {
    pub body: Value,
    pub application_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SandboxApiError {
    #[error("Method not found")]
    MethodNotFound,
    #[error("{0}")]
    Failed(String),
}

impl From<String> for SandboxApiError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

/// Methods one node module exposes to dapps.
#[async_trait]
pub trait SandboxApi: Send + Sync {
    async fn call(&self, method: &str, args: SandboxArgs) -> Result<Value, SandboxApiError>;
}

/// Module name to sandbox API. `None` marks a module with no sandbox surface.
#[derive(Default, Clone)]
pub struct ModuleTable {
    modules: HashMap<&'static str, Option<Arc<dyn SandboxApi>>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(mut self, module: &'static str, api: Arc<dyn SandboxApi>) -> Self {
        self.modules.insert(module, Some(api));
        self
    }

    pub fn without_api(mut self, module: &'static str) -> Self {
        self.modules.insert(module, None);
        self
    }

    /// Route a dapp-issued call. Errors are plain strings sent back to the dapp.
    pub async fn dispatch(&self, call: SandboxCall) -> Result<Value, String> {
        let Some((module, method)) = call.call.split_once('#') else {
            return Err(format!("Invalid call {}", call.call));
        };
        let api = match self.modules.get(module) {
            None => return Err(format!("Invalid module in call: {}", call.call)),
            Some(None) => return Err("This module doesn't have sandbox api".to_string()),
            Some(Some(api)) => api.clone(),
        };
        debug!(dapp_id = %call.application_id, call = %call.call, "Sandbox api call");
        let args = SandboxArgs {
            body: call.args,
            application_id: call.application_id,
        };
        api.call(method, args).await.map_err(|e| match e {
            SandboxApiError::MethodNotFound => format!("Method not found: {}", call.call),
            SandboxApiError::Failed(message) => message,
        })
    }
}

/// Node-to-dapp request path.
pub struct SandboxBridge {
    registry: Arc<DappRegistry>,
}

impl SandboxBridge {
    pub fn new(registry: Arc<DappRegistry>) -> Self {
        Self { registry }
    }

    /// Forward a request. Fails with "Dapp not found" without a sandbox and
    /// "Dapp not ready" until the dapp called `dapps#setReady`.
    pub async fn request(
        &self,
        dapp_id: &str,
        method: &str,
        path: &str,
        query: Value,
    ) -> Result<Value, SandboxError> {
        let handle = self.registry.ready_sandbox(dapp_id)?;
        handle
            .request(SandboxRequest::new(method, path, query))
            .await
    }

    pub async fn message(&self, dapp_id: &str, notification: SandboxNotification) -> Result<Value, SandboxError> {
        let body = serde_json::to_value(&notification).map_err(|e| SandboxError::Channel(e.to_string()))?;
        self.request(dapp_id, "post", "/message", body).await
    }
}

#[async_trait]
impl DappNotifier for SandboxBridge {
    async fn notify(&self, dapp_id: &str, notification: SandboxNotification) -> Result<Value, SandboxError> {
        self.message(dapp_id, notification).await
    }
}
