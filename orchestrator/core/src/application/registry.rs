// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dapp Registry
//!
//! Runtime bookkeeping for every dapp this node hosts: lifecycle phase,
//! sandbox slot with its readiness flag, mounted routes and the `default`
//! route binding. One lock guards all of it, so phase checks and slot changes
//! are never observed half-applied.

use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::dapp::DappError;
use crate::domain::lifecycle::DappPhase;
use crate::domain::sandbox::{SandboxError, SandboxHandle};

/// Prefix that resolves to the first dapp whose routes were mounted.
pub const DEFAULT_ROUTE_PREFIX: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    Get,
    Post,
    Put,
}

impl RouteMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
        }
    }

    /// Case-insensitive; any other verb is not mountable.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            _ => None,
        }
    }
}

/// One entry of a dapp's `routes.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DappRoute {
    pub method: RouteMethod,
    pub path: String,
}

impl DappRoute {
    /// Segment-wise match; `:name` segments match anything.
    pub fn matches(&self, method: RouteMethod, path: &str) -> bool {
        if self.method != method {
            return false;
        }
        let pattern: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        pattern.len() == actual.len()
            && pattern
                .iter()
                .zip(&actual)
                .all(|(p, a)| p.starts_with(':') || p == a)
    }
}

struct SandboxSlot {
    handle: Arc<dyn SandboxHandle>,
    ready: bool,
}

#[derive(Default)]
struct RegistryState {
    phases: HashMap<String, DappPhase>,
    sandboxes: HashMap<String, SandboxSlot>,
    routes: HashMap<String, Vec<DappRoute>>,
    default_route: Option<String>,
}

impl RegistryState {
    fn ids_where(&self, predicate: impl Fn(DappPhase) -> bool) -> Vec<String> {
        let mut ids: Vec<String> = self
            .phases
            .iter()
            .filter(|(_, phase)| predicate(**phase))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
pub struct DappRegistry {
    state: Mutex<RegistryState>,
}

impl DappRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, id: &str) -> Option<DappPhase> {
        self.state.lock().phases.get(id).copied()
    }

    /// Claim `id` for download. Fails fast while another install or removal runs.
    pub fn begin_install(&self, id: &str) -> Result<(), DappError> {
        let mut state = self.state.lock();
        if state.phases.get(id).is_some_and(|p| p.is_busy()) {
            return Err(DappError::Conflict(
                "This DApp already on downloading/removing".to_string(),
            ));
        }
        state.phases.insert(id.to_string(), DappPhase::Installing);
        Ok(())
    }

    pub fn finish_install(&self, id: &str, installed: bool) {
        let phase = if installed {
            DappPhase::Installed
        } else {
            DappPhase::Failed
        };
        self.state.lock().phases.insert(id.to_string(), phase);
    }

    /// Claim `id` for uninstall, returning the phase it had.
    pub fn begin_removal(&self, id: &str) -> Result<Option<DappPhase>, DappError> {
        let mut state = self.state.lock();
        let previous = state.phases.get(id).copied();
        if previous.is_some_and(|p| p.is_busy()) {
            return Err(DappError::Conflict(
                "This DApp already on uninstall/loading".to_string(),
            ));
        }
        state.phases.insert(id.to_string(), DappPhase::Removing);
        Ok(previous)
    }

    pub fn finish_removal(&self, id: &str) {
        self.state.lock().phases.remove(id);
    }

    pub fn begin_launch(&self, id: &str) -> Result<(), DappError> {
        let mut state = self.state.lock();
        match state.phases.get(id) {
            Some(phase) if phase.is_launched() => {
                return Err(DappError::Conflict("Dapp already launched".to_string()))
            }
            Some(DappPhase::Stopping) => {
                return Err(DappError::Conflict("Dapp is stopping".to_string()))
            }
            Some(phase) if phase.is_busy() => {
                return Err(DappError::Validation("Dapp not installed".to_string()))
            }
            _ => {}
        }
        state.phases.insert(id.to_string(), DappPhase::Launching);
        Ok(())
    }

    /// Mark a launch that failed before any sandbox existed.
    pub fn abort_launch(&self, id: &str) {
        let mut state = self.state.lock();
        if state.phases.get(id) == Some(&DappPhase::Launching) {
            state.phases.insert(id.to_string(), DappPhase::Failed);
        }
    }

    pub fn attach_sandbox(&self, id: &str, handle: Arc<dyn SandboxHandle>) {
        self.state.lock().sandboxes.insert(
            id.to_string(),
            SandboxSlot {
                handle,
                ready: false,
            },
        );
    }

    pub fn mount_routes(&self, id: &str, routes: Vec<DappRoute>) {
        self.state.lock().routes.insert(id.to_string(), routes);
    }

    /// Promote a launching dapp to running and bind it to the default route
    /// if that is free. `None` if it was stopped meanwhile, otherwise whether
    /// `id` became the default.
    pub fn mark_running(&self, id: &str) -> Option<bool> {
        let mut state = self.state.lock();
        if state.phases.get(id) != Some(&DappPhase::Launching) || !state.sandboxes.contains_key(id) {
            return None;
        }
        state.phases.insert(id.to_string(), DappPhase::Running);
        if state.default_route.is_none() {
            state.default_route = Some(id.to_string());
            return Some(true);
        }
        Some(false)
    }

    pub fn set_ready(&self, id: &str) -> bool {
        match self.state.lock().sandboxes.get_mut(id) {
            Some(slot) => {
                slot.ready = true;
                true
            }
            None => false,
        }
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.state.lock().sandboxes.get(id).is_some_and(|slot| slot.ready)
    }

    /// Handle of a ready sandbox.
    pub fn ready_sandbox(&self, id: &str) -> Result<Arc<dyn SandboxHandle>, SandboxError> {
        let state = self.state.lock();
        let slot = state.sandboxes.get(id).ok_or(SandboxError::NotFound)?;
        if !slot.ready {
            return Err(SandboxError::NotReady);
        }
        Ok(slot.handle.clone())
    }

    /// Detach the sandbox and routes of `id`, moving a launched dapp to
    /// `Stopping` until [`finish_stop`](Self::finish_stop).
    ///
    /// With `instance` set, nothing happens unless that exact instance still
    /// occupies the slot, so a late exit of a replaced process is ignored.
    pub fn detach(&self, id: &str, instance: Option<Uuid>) -> Option<Arc<dyn SandboxHandle>> {
        let mut state = self.state.lock();
        if let Some(expected) = instance {
            let current = state.sandboxes.get(id).map(|slot| slot.handle.instance_id());
            if current != Some(expected) {
                return None;
            }
        }
        let slot = state.sandboxes.remove(id);
        state.routes.remove(id);
        if state.phases.get(id).is_some_and(|p| p.is_launched()) {
            state.phases.insert(id.to_string(), DappPhase::Stopping);
        }
        slot.map(|slot| slot.handle)
    }

    pub fn finish_stop(&self, id: &str) {
        let mut state = self.state.lock();
        if state.phases.get(id) == Some(&DappPhase::Stopping) {
            state.phases.insert(id.to_string(), DappPhase::Stopped);
        }
    }

    /// Resolve a mount prefix and request to the owning dapp and the matched route.
    pub fn resolve_route(&self, prefix: &str, method: RouteMethod, path: &str) -> Option<(String, DappRoute)> {
        let state = self.state.lock();
        let id = if prefix == DEFAULT_ROUTE_PREFIX {
            state.default_route.clone()?
        } else {
            prefix.to_string()
        };
        let route = state
            .routes
            .get(&id)?
            .iter()
            .find(|route| route.matches(method, path))?
            .clone();
        Some((id, route))
    }

    pub fn default_route(&self) -> Option<String> {
        self.state.lock().default_route.clone()
    }

    pub fn launched_ids(&self) -> Vec<String> {
        self.state.lock().ids_where(DappPhase::is_launched)
    }

    pub fn installing_ids(&self) -> Vec<String> {
        self.state.lock().ids_where(|p| p == DappPhase::Installing)
    }

    pub fn removing_ids(&self) -> Vec<String> {
        self.state.lock().ids_where(|p| p == DappPhase::Removing)
    }

    /// Ids with a live sandbox, ready or not.
    pub fn sandbox_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().sandboxes.keys().cloned().collect();
        ids.sort();
        ids
    }
}
