// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Transaction envelopes, the asset type handler contract, dapp and issued
//! asset aggregates, and the seams (repositories, sandbox runtime) the
//! application layer is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types, invariants and traits at the seams

pub mod address;
pub mod asset_type;
pub mod dapp;
pub mod events;
pub mod lifecycle;
pub mod node_config;
pub mod repository;
pub mod reservation;
pub mod sandbox;
pub mod transaction;
pub mod uia;
