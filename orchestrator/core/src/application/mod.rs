// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Ledger handlers for dapp and issued-asset transactions, and the dapp host
//! services built on the domain seams: install, launch, teardown, the sandbox
//! bridge with its shared API, ledger fan-out and the [`DappService`] facade.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Use cases and pipelines

pub mod asset_types;
pub mod bridge;
pub mod dapp_service;
pub mod fanout;
pub mod install;
pub mod launch;
pub mod orders;
pub mod registry;
pub mod shared_api;
pub mod teardown;

pub use dapp_service::{DappService, DappServiceDeps};
pub use registry::DappRegistry;
