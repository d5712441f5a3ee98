// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence and external-collaborator contracts. Interfaces are defined in
//! the domain layer and implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Backs | Implementations |
//! |-------|-------|----------------|
//! | `DappRepository` | confirmed registrations | `InMemoryDappRepository` |
//! | `TransferRepository` | deposits and withdrawals | `InMemoryTransferRepository` |
//! | `AssetRepository` | issuers, issued assets, ACLs | `InMemoryAssetRepository` |
//! | `AccountLedger` | account balances | `InMemoryAccountLedger` |
//! | `PeerRegistry` | per-dapp peer lists | `InMemoryPeerRegistry` |
//! | `SchemaProvisioner` | per-dapp relational tables | `InMemorySchemaProvisioner` |
//! | `TransactionSubmitter` | signing and pool admission | `RecordingTransactionSubmitter` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::asset_type::TransactionError;
use crate::domain::dapp::{DappQuery, DappRecord, InTransferRecord, OutTransferRecord};
use crate::domain::transaction::{Account, Asset, TransactionType};
use crate::domain::uia::{AclFlag, IssuedAsset, Issuer};

#[async_trait]
pub trait DappRepository: Send + Sync {
    /// Insert a confirmed registration. A name or link clash is `Duplicate`.
    async fn save(&self, record: &DappRecord) -> Result<(), RepositoryError>;

    async fn delete(&self, transaction_id: &str) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, transaction_id: &str) -> Result<Option<DappRecord>, RepositoryError>;

    async fn exists(&self, transaction_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.find_by_id(transaction_id).await?.is_some())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<DappRecord>, RepositoryError>;

    /// Records sharing `name` or `link`, ignoring `exclude_id`.
    async fn find_conflicting(
        &self,
        name: &str,
        link: Option<&str>,
        exclude_id: &str,
    ) -> Result<Vec<DappRecord>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    async fn list(&self, query: &DappQuery) -> Result<Vec<DappRecord>, RepositoryError>;
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn save_in_transfer(&self, record: &InTransferRecord) -> Result<(), RepositoryError>;

    async fn save_out_transfer(&self, record: &OutTransferRecord) -> Result<(), RepositoryError>;

    /// Confirmed deposits into `dapp_id`, ordered by height.
    async fn in_transfers(&self, dapp_id: &str) -> Result<Vec<InTransferRecord>, RepositoryError>;

    /// `true` when a confirmed withdrawal already references `out_transaction_id`.
    async fn out_transfer_exists(&self, out_transaction_id: &str) -> Result<bool, RepositoryError>;

    /// Most recent confirmed withdrawal out of `dapp_id`.
    async fn last_out_transfer(&self, dapp_id: &str) -> Result<Option<OutTransferRecord>, RepositoryError>;
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn save_issuer(&self, issuer: &Issuer) -> Result<(), RepositoryError>;

    async fn find_issuer_by_name(&self, name: &str) -> Result<Option<Issuer>, RepositoryError>;

    async fn find_issuer_by_address(&self, address: &str) -> Result<Option<Issuer>, RepositoryError>;

    async fn list_issuers(&self, limit: usize, offset: usize) -> Result<(Vec<Issuer>, usize), RepositoryError>;

    /// Insert or replace an asset keyed by its full `ISSUER.CODE` name.
    async fn save_asset(&self, asset: &IssuedAsset) -> Result<(), RepositoryError>;

    async fn find_asset(&self, name: &str) -> Result<Option<IssuedAsset>, RepositoryError>;

    async fn list_assets(
        &self,
        issuer: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<IssuedAsset>, usize), RepositoryError>;

    async fn acl_contains(&self, currency: &str, flag: AclFlag, address: &str) -> Result<bool, RepositoryError>;

    async fn acl_add(&self, currency: &str, flag: AclFlag, addresses: &[String]) -> Result<(), RepositoryError>;

    async fn acl_remove(&self, currency: &str, flag: AclFlag, addresses: &[String]) -> Result<(), RepositoryError>;
}

/// Balance bookkeeping owned by the external ledger.
#[async_trait]
pub trait AccountLedger: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<Option<Account>, RepositoryError>;

    /// Apply signed deltas, creating the account when absent.
    async fn merge(&self, address: &str, balance: i64, u_balance: i64) -> Result<Account, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: String,
    pub port: u16,
}

#[async_trait]
pub trait PeerRegistry: Send + Sync {
    async fn add_dapp_peer(&self, dapp_id: &str, peer: &PeerAddress) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SchemaProvisioner: Send + Sync {
    /// Create the tables described by a dapp's `blockchain.json`.
    async fn create_tables(&self, dapp_id: &str, schema: &serde_json::Value) -> Result<(), RepositoryError>;

    async fn drop_tables(&self, dapp_id: &str, schema: &serde_json::Value) -> Result<(), RepositoryError>;
}

/// A transfer order to be signed and admitted to the unconfirmed pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOrder {
    pub tx_type: TransactionType,
    pub secret: String,
    pub second_secret: Option<String>,
    pub public_key: Option<String>,
    pub multisig_account_public_key: Option<String>,
    pub amount: u64,
    pub recipient_id: Option<String>,
    pub asset: Asset,
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Returns the id of the admitted transaction.
    async fn submit(&self, order: TransferOrder) -> Result<String, TransactionError>;
}

/// Repository errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
