// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementations of the persistence and collaborator contracts in
//! [`crate::domain::repository`]. The daemon runs on these until a relational
//! store is wired in; tests use them directly.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve ledger-side records
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! All maps sit behind `Arc<RwLock<..>>`, so clones share state.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::asset_type::TransactionError;
use crate::domain::dapp::{
    DappQuery, DappRecord, InTransferRecord, OutTransferRecord, SortDirection, SortField,
};
use crate::domain::repository::{
    AccountLedger, AssetRepository, DappRepository, PeerAddress, PeerRegistry, RepositoryError,
    SchemaProvisioner, TransactionSubmitter, TransferOrder, TransferRepository,
};
use crate::domain::transaction::Account;
use crate::domain::uia::{AclFlag, IssuedAsset, Issuer};

#[derive(Clone, Default)]
pub struct InMemoryDappRepository {
    dapps: Arc<RwLock<HashMap<String, DappRecord>>>,
}

impl InMemoryDappRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &DappRecord, b: &DappRecord, field: SortField) -> Ordering {
    match field {
        SortField::Type => a.dapp_type.cmp(&b.dapp_type),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Category => a.category.cmp(&b.category),
        SortField::Link => a.link.cmp(&b.link),
    }
}

#[async_trait]
impl DappRepository for InMemoryDappRepository {
    async fn save(&self, record: &DappRecord) -> Result<(), RepositoryError> {
        let mut dapps = self.dapps.write();
        if dapps.contains_key(&record.transaction_id) {
            return Err(RepositoryError::Duplicate(format!(
                "Dapp already exists: {}",
                record.transaction_id
            )));
        }
        for existing in dapps.values() {
            if existing.name == record.name {
                return Err(RepositoryError::Duplicate(format!(
                    "Dapp name already exists: {}",
                    record.name
                )));
            }
            if record.link.is_some() && existing.link == record.link {
                return Err(RepositoryError::Duplicate(format!(
                    "Dapp link already exists: {}",
                    record.link.as_deref().unwrap_or_default()
                )));
            }
        }
        dapps.insert(record.transaction_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, transaction_id: &str) -> Result<(), RepositoryError> {
        self.dapps.write().remove(transaction_id);
        Ok(())
    }

    async fn find_by_id(&self, transaction_id: &str) -> Result<Option<DappRecord>, RepositoryError> {
        Ok(self.dapps.read().get(transaction_id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<DappRecord>, RepositoryError> {
        let dapps = self.dapps.read();
        Ok(ids.iter().filter_map(|id| dapps.get(id).cloned()).collect())
    }

    async fn find_conflicting(
        &self,
        name: &str,
        link: Option<&str>,
        exclude_id: &str,
    ) -> Result<Vec<DappRecord>, RepositoryError> {
        let dapps = self.dapps.read();
        Ok(dapps
            .values()
            .filter(|d| d.transaction_id != exclude_id)
            .filter(|d| d.name == name || (link.is_some() && d.link.as_deref() == link))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.dapps.read().len())
    }

    async fn list(&self, query: &DappQuery) -> Result<Vec<DappRecord>, RepositoryError> {
        let mut matches: Vec<DappRecord> = {
            let dapps = self.dapps.read();
            dapps
                .values()
                .filter(|d| query.category.is_none_or(|c| c.code() == d.category))
                .filter(|d| query.name.as_ref().is_none_or(|n| *n == d.name))
                .filter(|d| query.dapp_type.is_none_or(|t| t == d.dapp_type))
                .filter(|d| query.link.is_none() || query.link == d.link)
                .cloned()
                .collect()
        };

        // Registration order first so listings are stable without an explicit order.
        matches.sort_by(|a, b| {
            a.block_height
                .cmp(&b.block_height)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        if let Some(order) = query.order_by {
            matches.sort_by(|a, b| {
                let ordering = compare(a, b, order.field);
                match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(matches
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.effective_limit())
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTransferRepository {
    in_transfers: Arc<RwLock<Vec<InTransferRecord>>>,
    out_transfers: Arc<RwLock<Vec<OutTransferRecord>>>,
}

impl InMemoryTransferRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferRepository for InMemoryTransferRepository {
    async fn save_in_transfer(&self, record: &InTransferRecord) -> Result<(), RepositoryError> {
        let mut transfers = self.in_transfers.write();
        if transfers.iter().any(|t| t.transaction_id == record.transaction_id) {
            return Err(RepositoryError::Duplicate(format!(
                "In transfer already exists: {}",
                record.transaction_id
            )));
        }
        transfers.push(record.clone());
        Ok(())
    }

    async fn save_out_transfer(&self, record: &OutTransferRecord) -> Result<(), RepositoryError> {
        let mut transfers = self.out_transfers.write();
        if transfers
            .iter()
            .any(|t| t.out_transaction_id == record.out_transaction_id)
        {
            return Err(RepositoryError::Duplicate(format!(
                "Transaction is already confirmed: {}",
                record.out_transaction_id
            )));
        }
        transfers.push(record.clone());
        Ok(())
    }

    async fn in_transfers(&self, dapp_id: &str) -> Result<Vec<InTransferRecord>, RepositoryError> {
        let mut matches: Vec<InTransferRecord> = self
            .in_transfers
            .read()
            .iter()
            .filter(|t| t.dapp_id == dapp_id)
            .cloned()
            .collect();
        matches.sort_by_key(|t| t.height);
        Ok(matches)
    }

    async fn out_transfer_exists(&self, out_transaction_id: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .out_transfers
            .read()
            .iter()
            .any(|t| t.out_transaction_id == out_transaction_id))
    }

    async fn last_out_transfer(&self, dapp_id: &str) -> Result<Option<OutTransferRecord>, RepositoryError> {
        // max_by_key keeps the last of equal heights, i.e. the latest insert.
        Ok(self
            .out_transfers
            .read()
            .iter()
            .filter(|t| t.dapp_id == dapp_id)
            .max_by_key(|t| t.height)
            .cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAssetRepository {
    issuers: Arc<RwLock<HashMap<String, Issuer>>>,
    assets: Arc<RwLock<HashMap<String, IssuedAsset>>>,
    acl: Arc<RwLock<HashMap<(String, AclFlag), HashSet<String>>>>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(mut items: Vec<T>, limit: usize, offset: usize) -> (Vec<T>, usize) {
    let count = items.len();
    let items = items.drain(..).skip(offset).take(limit).collect();
    (items, count)
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn save_issuer(&self, issuer: &Issuer) -> Result<(), RepositoryError> {
        let mut issuers = self.issuers.write();
        if issuers.contains_key(&issuer.name) {
            return Err(RepositoryError::Duplicate(format!(
                "Issuer name already exists: {}",
                issuer.name
            )));
        }
        issuers.insert(issuer.name.clone(), issuer.clone());
        Ok(())
    }

    async fn find_issuer_by_name(&self, name: &str) -> Result<Option<Issuer>, RepositoryError> {
        Ok(self.issuers.read().get(name).cloned())
    }

    async fn find_issuer_by_address(&self, address: &str) -> Result<Option<Issuer>, RepositoryError> {
        Ok(self
            .issuers
            .read()
            .values()
            .find(|i| i.issuer_id == address)
            .cloned())
    }

    async fn list_issuers(&self, limit: usize, offset: usize) -> Result<(Vec<Issuer>, usize), RepositoryError> {
        let mut issuers: Vec<Issuer> = self.issuers.read().values().cloned().collect();
        issuers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(issuers, limit, offset))
    }

    async fn save_asset(&self, asset: &IssuedAsset) -> Result<(), RepositoryError> {
        self.assets.write().insert(asset.name.clone(), asset.clone());
        Ok(())
    }

    async fn find_asset(&self, name: &str) -> Result<Option<IssuedAsset>, RepositoryError> {
        Ok(self.assets.read().get(name).cloned())
    }

    async fn list_assets(
        &self,
        issuer: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<IssuedAsset>, usize), RepositoryError> {
        let mut assets: Vec<IssuedAsset> = self
            .assets
            .read()
            .values()
            .filter(|a| issuer.is_none_or(|name| a.issuer_name == name))
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(assets, limit, offset))
    }

    async fn acl_contains(&self, currency: &str, flag: AclFlag, address: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .acl
            .read()
            .get(&(currency.to_string(), flag))
            .is_some_and(|list| list.contains(address)))
    }

    async fn acl_add(&self, currency: &str, flag: AclFlag, addresses: &[String]) -> Result<(), RepositoryError> {
        self.acl
            .write()
            .entry((currency.to_string(), flag))
            .or_default()
            .extend(addresses.iter().cloned());
        Ok(())
    }

    async fn acl_remove(&self, currency: &str, flag: AclFlag, addresses: &[String]) -> Result<(), RepositoryError> {
        if let Some(list) = self.acl.write().get_mut(&(currency.to_string(), flag)) {
            for address in addresses {
                list.remove(address);
            }
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAccountLedger {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace an account.
    pub fn insert(&self, account: Account) {
        self.accounts.write().insert(account.address.clone(), account);
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

#[async_trait]
impl AccountLedger for InMemoryAccountLedger {
    async fn get_account(&self, address: &str) -> Result<Option<Account>, RepositoryError> {
        Ok(self.accounts.read().get(address).cloned())
    }

    async fn merge(&self, address: &str, balance: i64, u_balance: i64) -> Result<Account, RepositoryError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .entry(address.to_string())
            .or_insert_with(|| Account::new(address));
        account.balance = account
            .balance
            .checked_add(balance)
            .ok_or_else(|| RepositoryError::Database(format!("Balance overflow for {}", address)))?;
        account.u_balance = account
            .u_balance
            .checked_add(u_balance)
            .ok_or_else(|| RepositoryError::Database(format!("Balance overflow for {}", address)))?;
        Ok(account.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPeerRegistry {
    peers: Arc<RwLock<HashMap<String, Vec<PeerAddress>>>>,
}

impl InMemoryPeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peers(&self, dapp_id: &str) -> Vec<PeerAddress> {
        self.peers.read().get(dapp_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl PeerRegistry for InMemoryPeerRegistry {
    async fn add_dapp_peer(&self, dapp_id: &str, peer: &PeerAddress) -> Result<(), RepositoryError> {
        let mut peers = self.peers.write();
        let list = peers.entry(dapp_id.to_string()).or_default();
        if !list.contains(peer) {
            list.push(peer.clone());
        }
        Ok(())
    }
}

/// Tracks which dapps currently have provisioned tables.
#[derive(Clone, Default)]
pub struct InMemorySchemaProvisioner {
    tables: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    fail_drops: bool,
}

impl InMemorySchemaProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provisioner whose `drop_tables` always fails.
    pub fn failing_drops() -> Self {
        Self {
            fail_drops: true,
            ..Self::default()
        }
    }

    pub fn has_tables(&self, dapp_id: &str) -> bool {
        self.tables.read().contains_key(dapp_id)
    }
}

#[async_trait]
impl SchemaProvisioner for InMemorySchemaProvisioner {
    async fn create_tables(&self, dapp_id: &str, schema: &serde_json::Value) -> Result<(), RepositoryError> {
        self.tables.write().insert(dapp_id.to_string(), schema.clone());
        Ok(())
    }

    async fn drop_tables(&self, dapp_id: &str, _schema: &serde_json::Value) -> Result<(), RepositoryError> {
        if self.fail_drops {
            return Err(RepositoryError::Database(format!(
                "Failed to drop tables for {}",
                dapp_id
            )));
        }
        self.tables.write().remove(dapp_id);
        Ok(())
    }
}

/// Accepts every order and remembers it; ids are random.
#[derive(Clone, Default)]
pub struct RecordingTransactionSubmitter {
    orders: Arc<Mutex<Vec<(String, TransferOrder)>>>,
}

impl RecordingTransactionSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<(String, TransferOrder)> {
        self.orders.lock().clone()
    }
}

#[async_trait]
impl TransactionSubmitter for RecordingTransactionSubmitter {
    async fn submit(&self, order: TransferOrder) -> Result<String, TransactionError> {
        let id = Uuid::new_v4().simple().to_string();
        self.orders.lock().push((id.clone(), order));
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dapp::{DappCategory, OrderBy};

    fn record(id: &str, name: &str, category: u8, height: u64) -> DappRecord {
        DappRecord {
            transaction_id: id.to_string(),
            name: name.to_string(),
            description: None,
            tags: None,
            link: Some(format!("https://host/{}.zip", id)),
            icon: None,
            category,
            dapp_type: 0,
            author_id: "1".into(),
            block_id: None,
            block_height: Some(height),
        }
    }

    #[tokio::test]
    async fn dapp_save_rejects_name_clash() {
        let repo = InMemoryDappRepository::new();
        repo.save(&record("a", "Foo", 0, 1)).await.unwrap();
        let err = repo.save(&record("b", "Foo", 0, 2)).await.unwrap_err();
        assert_eq!(err.to_string(), "Dapp name already exists: Foo");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dapp_list_filters_sorts_and_pages() {
        let repo = InMemoryDappRepository::new();
        repo.save(&record("a", "Alpha", 1, 1)).await.unwrap();
        repo.save(&record("b", "Bravo", 1, 2)).await.unwrap();
        repo.save(&record("c", "Charlie", 2, 3)).await.unwrap();

        let query = DappQuery {
            category: Some(DappCategory::Business),
            order_by: Some("name:desc".parse::<OrderBy>().unwrap()),
            ..Default::default()
        };
        let names: Vec<String> = repo.list(&query).await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["Bravo", "Alpha"]);

        let paged = DappQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let listed = repo.list(&paged).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Bravo");
    }

    #[tokio::test]
    async fn conflicting_excludes_self() {
        let repo = InMemoryDappRepository::new();
        repo.save(&record("a", "Alpha", 1, 1)).await.unwrap();
        assert!(repo.find_conflicting("Alpha", None, "a").await.unwrap().is_empty());
        assert_eq!(repo.find_conflicting("Alpha", None, "z").await.unwrap().len(), 1);
        let link = "https://host/a.zip";
        assert_eq!(repo.find_conflicting("Other", Some(link), "z").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_merge_creates_and_updates() {
        let ledger = InMemoryAccountLedger::new();
        assert!(ledger.is_empty());
        let account = ledger.merge("9", 10, 5).await.unwrap();
        assert_eq!((account.balance, account.u_balance), (10, 5));
        let account = ledger.merge("9", -10, -5).await.unwrap();
        assert_eq!((account.balance, account.u_balance), (0, 0));
    }

    #[tokio::test]
    async fn acl_add_and_remove() {
        let repo = InMemoryAssetRepository::new();
        let list = vec!["1".to_string(), "2".to_string()];
        repo.acl_add("A.BCD", AclFlag::Whitelist, &list).await.unwrap();
        assert!(repo.acl_contains("A.BCD", AclFlag::Whitelist, "2").await.unwrap());
        assert!(!repo.acl_contains("A.BCD", AclFlag::Blacklist, "2").await.unwrap());
        repo.acl_remove("A.BCD", AclFlag::Whitelist, &list[..1]).await.unwrap();
        assert!(!repo.acl_contains("A.BCD", AclFlag::Whitelist, "1").await.unwrap());
    }

    #[tokio::test]
    async fn last_out_transfer_uses_height() {
        let repo = InMemoryTransferRepository::new();
        for (id, height) in [("o1", 5), ("o2", 9), ("o3", 7)] {
            repo.save_out_transfer(&OutTransferRecord {
                transaction_id: format!("t-{}", id),
                dapp_id: "d".into(),
                out_transaction_id: id.into(),
                recipient_id: "1".into(),
                amount: 1,
                height,
            })
            .await
            .unwrap();
        }
        let last = repo.last_out_transfer("d").await.unwrap().unwrap();
        assert_eq!(last.out_transaction_id, "o2");
        assert!(repo.out_transfer_exists("o3").await.unwrap());
        assert!(repo.last_out_transfer("other").await.unwrap().is_none());
    }
}
