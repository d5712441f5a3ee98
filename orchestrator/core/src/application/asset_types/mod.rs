// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Asset Type Registry
//!
//! Concrete [`AssetTypeHandler`]s and the registry the ledger dispatches
//! through, keyed by [`TransactionType`].
//!
//! | Type | Handler |
//! |------|---------|
//! | `Dapp` (5) | [`DappRegisterHandler`] |
//! | `InTransfer` (6) | [`DepositHandler`] |
//! | `OutTransfer` (7) | [`WithdrawalHandler`] |
//! | `UiaIssuer`..`UiaTransfer` (9-14) | [`uia`] handlers |

pub mod dapp_register;
pub mod deposit;
pub mod uia;
pub mod withdrawal;

pub use dapp_register::DappRegisterHandler;
pub use deposit::DepositHandler;
pub use withdrawal::WithdrawalHandler;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::asset_type::{AssetTypeHandler, TransactionError};
use crate::domain::reservation::ReservationIndex;
use crate::domain::repository::{AccountLedger, AssetRepository, DappRepository, TransferRepository};
use crate::domain::sandbox::DappNotifier;
use crate::domain::transaction::{Transaction, TransactionType, FIXED_POINT};
use crate::domain::uia::BalanceCache;
use crate::infrastructure::event_bus::EventBus;

/// Flat fee of a plain value transfer, also charged for deposits and withdrawals.
pub const TRANSFER_FEE: u64 = FIXED_POINT / 10;

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct LedgerContext {
    pub dapps: Arc<dyn DappRepository>,
    pub transfers: Arc<dyn TransferRepository>,
    pub assets: Arc<dyn AssetRepository>,
    pub accounts: Arc<dyn AccountLedger>,
    pub reservations: Arc<ReservationIndex>,
    pub balances: Arc<BalanceCache>,
    pub notifier: Arc<dyn DappNotifier>,
    pub event_bus: EventBus,
}

#[derive(Default, Clone)]
pub struct AssetTypeRegistry {
    handlers: HashMap<TransactionType, Arc<dyn AssetTypeHandler>>,
}

impl AssetTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every handler this crate provides.
    pub fn with_defaults(ctx: LedgerContext) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DappRegisterHandler::new(ctx.clone())));
        registry.register(Arc::new(DepositHandler::new(ctx.clone())));
        registry.register(Arc::new(WithdrawalHandler::new(ctx.clone())));
        for handler in uia::handlers(ctx) {
            registry.register(handler);
        }
        registry
    }

    /// Register `handler`, replacing any previous one for its type.
    pub fn register(&mut self, handler: Arc<dyn AssetTypeHandler>) {
        self.handlers.insert(handler.transaction_type(), handler);
    }

    pub fn get(&self, tx_type: TransactionType) -> Option<Arc<dyn AssetTypeHandler>> {
        self.handlers.get(&tx_type).cloned()
    }

    pub fn handler_for(&self, tx: &Transaction) -> Result<Arc<dyn AssetTypeHandler>, TransactionError> {
        self.get(tx.tx_type)
            .ok_or_else(|| TransactionError::validation(format!("Unknown transaction type {}", tx.tx_type)))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::sandbox::{SandboxError, SandboxNotification};
    use crate::infrastructure::repositories::{
        InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository,
        InMemoryTransferRepository,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Notifier that records deliveries and can be told to fail.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub delivered: Mutex<Vec<(String, SandboxNotification)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl DappNotifier for RecordingNotifier {
        async fn notify(
            &self,
            dapp_id: &str,
            notification: SandboxNotification,
        ) -> Result<serde_json::Value, SandboxError> {
            if self.fail {
                return Err(SandboxError::NotFound);
            }
            self.delivered.lock().push((dapp_id.to_string(), notification));
            Ok(serde_json::json!({}))
        }
    }

    pub struct Fixture {
        pub ctx: LedgerContext,
        pub dapps: Arc<InMemoryDappRepository>,
        pub transfers: Arc<InMemoryTransferRepository>,
        pub assets: Arc<InMemoryAssetRepository>,
        pub accounts: Arc<InMemoryAccountLedger>,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub fn fixture() -> Fixture {
        fixture_with_notifier(RecordingNotifier::default())
    }

    pub fn fixture_with_notifier(notifier: RecordingNotifier) -> Fixture {
        let dapps = Arc::new(InMemoryDappRepository::new());
        let transfers = Arc::new(InMemoryTransferRepository::new());
        let assets = Arc::new(InMemoryAssetRepository::new());
        let accounts = Arc::new(InMemoryAccountLedger::new());
        let notifier = Arc::new(notifier);
        let ctx = LedgerContext {
            dapps: dapps.clone(),
            transfers: transfers.clone(),
            assets: assets.clone(),
            accounts: accounts.clone(),
            reservations: Arc::new(ReservationIndex::new()),
            balances: Arc::new(BalanceCache::new()),
            notifier: notifier.clone(),
            event_bus: EventBus::new(16),
        };
        Fixture {
            ctx,
            dapps,
            transfers,
            assets,
            accounts,
            notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::Account;

    #[test]
    fn default_registry_covers_all_asset_types() {
        let fixture = test_support::fixture();
        let registry = AssetTypeRegistry::with_defaults(fixture.ctx);
        assert_eq!(registry.len(), 9);
        for tx_type in [
            TransactionType::Dapp,
            TransactionType::InTransfer,
            TransactionType::OutTransfer,
            TransactionType::UiaIssuer,
            TransactionType::UiaAsset,
            TransactionType::UiaFlags,
            TransactionType::UiaAcl,
            TransactionType::UiaIssue,
            TransactionType::UiaTransfer,
        ] {
            assert_eq!(registry.get(tx_type).map(|h| h.transaction_type()), Some(tx_type));
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = AssetTypeRegistry::new();
        let tx = Transaction::template("t", TransactionType::Vote, &Account::new("1"));
        let err = registry.handler_for(&tx).err().unwrap();
        assert!(err.to_string().starts_with("Unknown transaction type"));
    }
}
