// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ledger event fan-out.
//!
//! Block events become `POST /message` notifications to every live sandbox.
//! Delivery is spawned per dapp and never blocks the ledger; a failed
//! delivery is logged and counted, not retried.

use metrics::counter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::application::registry::DappRegistry;
use crate::domain::sandbox::{DappNotifier, SandboxNotification};
use crate::domain::transaction::Block;

pub struct LedgerFanout {
    registry: Arc<DappRegistry>,
    notifier: Arc<dyn DappNotifier>,
}

impl LedgerFanout {
    pub fn new(registry: Arc<DappRegistry>, notifier: Arc<dyn DappNotifier>) -> Self {
        Self { registry, notifier }
    }

    /// Announce a new block. Nothing is sent unless `broadcast` is set.
    pub fn on_new_block(&self, block: &Block, broadcast: bool) -> Vec<JoinHandle<()>> {
        if !broadcast {
            return Vec::new();
        }
        self.publish(SandboxNotification::Point {
            id: block.id.clone(),
            height: block.height,
        })
    }

    /// Announce that blocks above `block` are being rolled back.
    pub fn on_delete_blocks_before(&self, block: &Block) -> Vec<JoinHandle<()>> {
        self.publish(SandboxNotification::Rollback {
            point_id: block.id.clone(),
            point_height: block.height,
        })
    }

    fn publish(&self, notification: SandboxNotification) -> Vec<JoinHandle<()>> {
        self.registry
            .sandbox_ids()
            .into_iter()
            .map(|dapp_id| {
                let notifier = self.notifier.clone();
                let notification = notification.clone();
                tokio::spawn(async move {
                    let topic = notification.topic();
                    if let Err(e) = notifier.notify(&dapp_id, notification).await {
                        counter!("dapp_fanout_failures_total", "topic" => topic).increment(1);
                        warn!(dapp_id = %dapp_id, topic, error = %e, "Failed to deliver ledger notification");
                    }
                })
            })
            .collect()
    }
}
