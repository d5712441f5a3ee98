// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Asset Type Handler Contract
//!
//! Every transaction type that carries an asset payload plugs into the ledger
//! through [`AssetTypeHandler`]. The ledger drives the same lifecycle for all
//! of them:
//!
//! | Phase | Operations |
//! |-------|-----------|
//! | construction | `create`, `calculate_fee`, `get_bytes` |
//! | admission | `normalize`, `verify`, `process`, `is_ready` |
//! | unconfirmed pool | `apply_unconfirmed` / `undo_unconfirmed` |
//! | block | `apply` / `undo`, `save_to_storage` |
//! | reload | `read_from_storage` |
//!
//! `apply`/`undo` and the unconfirmed pair are exact inverses. Validation
//! returns on the first violated rule and never mutates state.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::repository::RepositoryError;
use crate::domain::transaction::{Account, Asset, Block, CreateData, Transaction, TransactionType};

/// Column-name to value map of one joined storage row.
pub type StorageRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Normalization(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Ledger(String),
}

impl TransactionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Missing {0} asset payload")]
    MissingAsset(&'static str),
}

#[async_trait]
pub trait AssetTypeHandler: Send + Sync {
    fn transaction_type(&self) -> TransactionType;

    /// Fill the type-specific fields of an unsigned transaction.
    fn create(&self, data: CreateData, tx: Transaction) -> Result<Transaction, TransactionError>;

    fn calculate_fee(&self, tx: &Transaction, sender: &Account) -> u64;

    /// Stateless checks plus uniqueness against confirmed storage.
    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError>;

    /// Checks against current state before admission to the unconfirmed pool.
    async fn process(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError>;

    /// Asset bytes appended to the signed payload.
    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError>;

    async fn apply(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<(), TransactionError>;

    async fn undo(&self, tx: &Transaction, block: &Block, sender: &Account) -> Result<(), TransactionError>;

    async fn apply_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError>;

    async fn undo_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError>;

    /// Schema checks on a transaction received from the outside.
    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError>;

    /// Rebuild the asset from a joined storage row; `None` when this type's
    /// columns are absent.
    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError>;

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError>;

    /// Multisignature readiness. Accounts without multisignature keys are
    /// always ready; otherwise `multimin - 1` attached signatures suffice.
    fn is_ready(&self, tx: &Transaction, sender: &Account) -> bool {
        if sender.multisignatures.is_empty() {
            return true;
        }
        match &tx.signatures {
            Some(signatures) => signatures.len() as i64 >= i64::from(sender.multimin) - 1,
            None => false,
        }
    }
}

/// Read an optional string column.
pub fn row_str(row: &StorageRow, column: &str) -> Option<String> {
    match row.get(column) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Read a numeric column, accepting numbers stored as strings.
pub fn row_u64(row: &StorageRow, column: &str) -> Option<u64> {
    match row.get(column) {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}
