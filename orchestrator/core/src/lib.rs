// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # aegis-dapps-core
//!
//! Host for side-chain applications ("dapps") registered on the ledger:
//! installs bundles from their registered link, launches each one in a
//! sandboxed process, bridges sandbox calls to the node's shared API and
//! fans ledger events out to running dapps.
//!
//! # Architecture
//!
//! - [`domain`]: records, transactions, lifecycle states and the ports
//!   (repositories, sandbox runtime) the host depends on
//! - [`application`]: [`DappService`](application::DappService) and the
//!   pipelines it composes
//! - [`infrastructure`]: in-memory repositories, bundle download and
//!   extraction, the process sandbox runtime and the event bus
//! - [`presentation`]: the axum router

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
