// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface over [`DappService`](crate::application::DappService). No
//! lifecycle logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Lifecycle endpoints and routes mounted by running dapps |

pub mod api;
