// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Adapters behind the domain seams: in-memory repositories, the OS-process
//! sandbox runtime, bundle download and extraction, and the event bus.

pub mod archive;
pub mod downloader;
pub mod event_bus;
pub mod repositories;
pub mod sandbox_process;

pub use sandbox_process::ProcessSandboxRuntime;
