// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sandbox Shared API
//!
//! Node functionality a running dapp may call through its message channel.
//!
//! | Module | Methods |
//! |--------|---------|
//! | `dapps` | `getGenesis`, `setReady`, `getCommonBlock`, `sendWithdrawal`, `getWithdrawalLastTransaction`, `getBalanceTransactions` |
//! | `uia` | `getFee`, `getIssuers`, `getIssuer`, `getAssets`, `getAsset`, `getBalances`, `getBalance` |
//!
//! Every method sees the calling dapp's id, never one supplied in the body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::application::bridge::{ModuleTable, SandboxApi, SandboxApiError, SandboxArgs};
use crate::application::orders::{parse_params, WithdrawalRequest};
use crate::application::registry::DappRegistry;
use crate::domain::address::is_address;
use crate::domain::dapp::DappGenesis;
use crate::domain::repository::{
    AccountLedger, AssetRepository, DappRepository, RepositoryError, TransactionSubmitter,
    TransferRepository,
};
use crate::domain::transaction::FIXED_POINT;
use crate::domain::uia::{BalanceCache, BalanceView, IssuedAsset, Issuer, MAX_CURRENCY_LEN};

/// Modules that exist on the node but expose nothing to dapps.
pub const CLOSED_MODULES: [&str; 5] = ["accounts", "blocks", "peer", "transactions", "sql"];

const MAX_PAGE: usize = 100;

/// Flat fee quoted to dapps for issued-asset operations.
pub const UIA_QUOTED_FEE: u64 = 5 * FIXED_POINT;

/// The node's full capability table.
pub fn module_table(dapps: Arc<DappsSandboxApi>, uia: Arc<UiaSandboxApi>) -> ModuleTable {
    CLOSED_MODULES
        .into_iter()
        .fold(ModuleTable::new(), |table, module| table.without_api(module))
        .with_api("dapps", dapps)
        .with_api("uia", uia)
}

fn database(e: RepositoryError) -> SandboxApiError {
    warn!(error = %e, "Sandbox api query failed");
    SandboxApiError::Failed("Database error".to_string())
}

fn to_value<T: Serialize>(value: T) -> Result<Value, SandboxApiError> {
    serde_json::to_value(value).map_err(|e| SandboxApiError::Failed(e.to_string()))
}

enum DappsCall {
    GetGenesis,
    SetReady,
    GetCommonBlock,
    SendWithdrawal,
    GetWithdrawalLastTransaction,
    GetBalanceTransactions,
}

impl DappsCall {
    fn parse(method: &str) -> Option<Self> {
        Some(match method {
            "getGenesis" => Self::GetGenesis,
            "setReady" => Self::SetReady,
            "getCommonBlock" => Self::GetCommonBlock,
            "sendWithdrawal" => Self::SendWithdrawal,
            "getWithdrawalLastTransaction" => Self::GetWithdrawalLastTransaction,
            "getBalanceTransactions" => Self::GetBalanceTransactions,
            _ => return None,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceTransactionsQuery {
    last_transaction_id: Option<String>,
}

/// `dapps` module.
pub struct DappsSandboxApi {
    dapps: Arc<dyn DappRepository>,
    transfers: Arc<dyn TransferRepository>,
    accounts: Arc<dyn AccountLedger>,
    registry: Arc<DappRegistry>,
    submitter: Arc<dyn TransactionSubmitter>,
}

impl DappsSandboxApi {
    pub fn new(
        dapps: Arc<dyn DappRepository>,
        transfers: Arc<dyn TransferRepository>,
        accounts: Arc<dyn AccountLedger>,
        registry: Arc<DappRegistry>,
        submitter: Arc<dyn TransactionSubmitter>,
    ) -> Self {
        Self {
            dapps,
            transfers,
            accounts,
            registry,
            submitter,
        }
    }

    /// Registration point and author of `dapp_id`, with the author's
    /// multisignature group as associates.
    pub async fn genesis(&self, dapp_id: &str) -> Result<DappGenesis, SandboxApiError> {
        let record = self
            .dapps
            .find_by_id(dapp_id)
            .await
            .map_err(database)?
            .ok_or_else(|| SandboxApiError::Failed("Database error".to_string()))?;
        let associate = self
            .accounts
            .get_account(&record.author_id)
            .await
            .map_err(database)?
            .map(|account| account.multisignatures)
            .unwrap_or_default();
        Ok(DappGenesis {
            point_id: record.block_id,
            point_height: record.block_height,
            author_id: record.author_id,
            dappid: dapp_id.to_string(),
            associate,
        })
    }

    async fn common_block(&self, dapp_id: &str) -> Result<Value, SandboxApiError> {
        let rows: Vec<Value> = self
            .transfers
            .in_transfers(dapp_id)
            .await
            .map_err(database)?
            .into_iter()
            .map(|t| {
                json!({
                    "height": t.height,
                    "id": t.transaction_id,
                    "senderId": t.sender_id,
                    "amount": t.amount.to_string(),
                })
            })
            .collect();
        Ok(Value::Array(rows))
    }

    async fn send_withdrawal(&self, args: SandboxArgs) -> Result<Value, SandboxApiError> {
        let request: WithdrawalRequest = parse_params(args.body)?;
        let order = request.into_order(&args.application_id)?;
        let transaction_id = self
            .submitter
            .submit(order)
            .await
            .map_err(|e| SandboxApiError::Failed(e.to_string()))?;
        Ok(json!({ "transactionId": transaction_id }))
    }

    async fn last_withdrawal(&self, dapp_id: &str) -> Result<Value, SandboxApiError> {
        Ok(self
            .transfers
            .last_out_transfer(dapp_id)
            .await
            .map_err(database)?
            .map(|t| json!({ "id": t.out_transaction_id }))
            .unwrap_or(Value::Null))
    }

    /// Deposits ordered by height, only those above `lastTransactionId` when
    /// given. An unknown reference yields nothing.
    async fn balance_transactions(&self, args: SandboxArgs) -> Result<Value, SandboxApiError> {
        let query: BalanceTransactionsQuery = parse_params(args.body)?;
        let deposits = self
            .transfers
            .in_transfers(&args.application_id)
            .await
            .map_err(database)?;
        let after = match query.last_transaction_id.as_deref() {
            None => None,
            Some(last) => match deposits.iter().find(|t| t.transaction_id == last) {
                Some(t) => Some(t.height),
                None => return Ok(Value::Array(Vec::new())),
            },
        };
        let rows = deposits
            .into_iter()
            .filter(|t| after.is_none_or(|height| t.height > height))
            .map(|t| {
                json!({
                    "id": t.transaction_id,
                    "senderPublicKey": t.sender_public_key.to_lowercase(),
                    "amount": t.amount,
                })
            })
            .collect();
        Ok(Value::Array(rows))
    }
}

#[async_trait]
impl SandboxApi for DappsSandboxApi {
    async fn call(&self, method: &str, args: SandboxArgs) -> Result<Value, SandboxApiError> {
        let call = DappsCall::parse(method).ok_or(SandboxApiError::MethodNotFound)?;
        match call {
            DappsCall::GetGenesis => to_value(self.genesis(&args.application_id).await?),
            DappsCall::SetReady => {
                self.registry.set_ready(&args.application_id);
                Ok(json!({}))
            }
            DappsCall::GetCommonBlock => self.common_block(&args.application_id).await,
            DappsCall::SendWithdrawal => self.send_withdrawal(args).await,
            DappsCall::GetWithdrawalLastTransaction => self.last_withdrawal(&args.application_id).await,
            DappsCall::GetBalanceTransactions => self.balance_transactions(args).await,
        }
    }
}

enum UiaCall {
    GetFee,
    GetIssuers,
    GetIssuer,
    GetAssets,
    GetAsset,
    GetBalances,
    GetBalance,
}

impl UiaCall {
    fn parse(method: &str) -> Option<Self> {
        Some(match method {
            "getFee" => Self::GetFee,
            "getIssuers" => Self::GetIssuers,
            "getIssuer" => Self::GetIssuer,
            "getAssets" => Self::GetAssets,
            "getAsset" => Self::GetAsset,
            "getBalances" => Self::GetBalances,
            "getBalance" => Self::GetBalance,
            _ => return None,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    limit: Option<usize>,
    offset: Option<usize>,
}

impl Page {
    fn bounds(&self) -> Result<(usize, usize), SandboxApiError> {
        let limit = self.limit.unwrap_or(MAX_PAGE);
        if limit > MAX_PAGE {
            return Err(SandboxApiError::Failed(format!(
                "Invalid parameters: limit must be at most {}",
                MAX_PAGE
            )));
        }
        Ok((limit, self.offset.unwrap_or(0)))
    }
}

#[derive(Debug, Deserialize)]
struct ByName {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AddressPage {
    address: String,
    #[serde(flatten)]
    page: Page,
}

#[derive(Debug, Deserialize)]
struct BalanceQuery {
    address: String,
    #[serde(default)]
    currency: String,
}

/// Issued asset as shown to dapps, amounts rendered as decimal strings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssetView {
    name: String,
    desc: String,
    maximum: String,
    precision: u8,
    quantity: String,
    strategy: String,
    acl_mode: u8,
    writeoff: bool,
    allow_writeoff: bool,
    allow_whitelist: bool,
    allow_blacklist: bool,
    issuer_name: String,
}

impl From<IssuedAsset> for AssetView {
    fn from(asset: IssuedAsset) -> Self {
        Self {
            name: asset.name,
            desc: asset.desc,
            maximum: asset.maximum.to_string(),
            precision: asset.precision,
            quantity: asset.quantity.to_string(),
            strategy: asset.strategy,
            acl_mode: asset.acl_mode.into(),
            writeoff: asset.writeoff,
            allow_writeoff: asset.allow_writeoff,
            allow_whitelist: asset.allow_whitelist,
            allow_blacklist: asset.allow_blacklist,
            issuer_name: asset.issuer_name,
        }
    }
}

fn issuer_view(issuer: Issuer) -> Value {
    json!({ "name": issuer.name, "desc": issuer.desc, "issuerId": issuer.issuer_id })
}

/// `uia` module. Read-only.
pub struct UiaSandboxApi {
    assets: Arc<dyn AssetRepository>,
    balances: Arc<BalanceCache>,
}

impl UiaSandboxApi {
    pub fn new(assets: Arc<dyn AssetRepository>, balances: Arc<BalanceCache>) -> Self {
        Self { assets, balances }
    }

    async fn issuers(&self, body: Value) -> Result<Value, SandboxApiError> {
        let (limit, offset) = parse_params::<Page>(body)?.bounds()?;
        let (issuers, count) = self.assets.list_issuers(limit, offset).await.map_err(database)?;
        let issuers: Vec<Value> = issuers.into_iter().map(issuer_view).collect();
        Ok(json!({ "issuers": issuers, "count": count }))
    }

    /// A name that is an address looks the issuer up by account.
    async fn issuer(&self, body: Value) -> Result<Value, SandboxApiError> {
        let ByName { name } = parse_params(body)?;
        let issuer = if is_address(&name) {
            self.assets.find_issuer_by_address(&name).await
        } else {
            if name.is_empty() || name.len() > 16 {
                return Err(SandboxApiError::Failed("Invalid parameters: name".to_string()));
            }
            self.assets.find_issuer_by_name(&name).await
        }
        .map_err(database)?
        .ok_or_else(|| SandboxApiError::Failed("Issuer not found".to_string()))?;
        Ok(json!({ "issuer": issuer_view(issuer) }))
    }

    async fn assets(&self, body: Value) -> Result<Value, SandboxApiError> {
        let (limit, offset) = parse_params::<Page>(body)?.bounds()?;
        let (assets, count) = self
            .assets
            .list_assets(None, limit, offset)
            .await
            .map_err(database)?;
        let assets: Vec<AssetView> = assets.into_iter().map(AssetView::from).collect();
        Ok(json!({ "assets": to_value(assets)?, "count": count }))
    }

    async fn asset(&self, body: Value) -> Result<Value, SandboxApiError> {
        let ByName { name } = parse_params(body)?;
        if name.is_empty() || name.len() > 32 {
            return Err(SandboxApiError::Failed("Invalid parameters: name".to_string()));
        }
        let asset = self
            .assets
            .find_asset(&name)
            .await
            .map_err(database)?
            .ok_or_else(|| SandboxApiError::Failed("Asset not found".to_string()))?;
        Ok(json!({ "asset": to_value(AssetView::from(asset))? }))
    }

    fn balances(&self, body: Value) -> Result<Value, SandboxApiError> {
        let query: AddressPage = parse_params(body)?;
        if !is_address(&query.address) {
            return Err(SandboxApiError::Failed("Invalid address".to_string()));
        }
        let (limit, offset) = query.page.bounds()?;
        let holdings = self.balances.balances_of(BalanceView::Confirmed, &query.address);
        let count = holdings.len();
        let balances: Vec<Value> = holdings
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(currency, balance)| balance_view(&query.address, currency, balance))
            .collect();
        Ok(json!({ "balances": balances, "count": count }))
    }

    fn balance(&self, body: Value) -> Result<Value, SandboxApiError> {
        let query: BalanceQuery = parse_params(body)?;
        if !is_address(&query.address) {
            return Err(SandboxApiError::Failed("Invalid address".to_string()));
        }
        if query.currency.is_empty() || query.currency.len() > MAX_CURRENCY_LEN {
            return Err(SandboxApiError::Failed("Invalid currency".to_string()));
        }
        let (currency, balance) = self
            .balances
            .balances_of(BalanceView::Confirmed, &query.address)
            .into_iter()
            .find(|(currency, _)| *currency == query.currency)
            .ok_or_else(|| SandboxApiError::Failed("Balance info not found".to_string()))?;
        Ok(json!({ "balance": balance_view(&query.address, currency, balance) }))
    }
}

fn balance_view(address: &str, currency: String, balance: u128) -> Value {
    json!({ "address": address, "currency": currency, "balance": balance.to_string() })
}

#[async_trait]
impl SandboxApi for UiaSandboxApi {
    async fn call(&self, method: &str, args: SandboxArgs) -> Result<Value, SandboxApiError> {
        match UiaCall::parse(method).ok_or(SandboxApiError::MethodNotFound)? {
            UiaCall::GetFee => Ok(json!({ "fee": UIA_QUOTED_FEE })),
            UiaCall::GetIssuers => self.issuers(args.body).await,
            UiaCall::GetIssuer => self.issuer(args.body).await,
            UiaCall::GetAssets => self.assets(args.body).await,
            UiaCall::GetAsset => self.asset(args.body).await,
            UiaCall::GetBalances => self.balances(args.body),
            UiaCall::GetBalance => self.balance(args.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::test_support::EchoHandle;
    use crate::domain::dapp::{DappRecord, InTransferRecord, OutTransferRecord};
    use crate::domain::sandbox::SandboxCall;
    use crate::domain::transaction::{Account, Asset};
    use crate::domain::uia::AclFlag;
    use crate::infrastructure::repositories::{
        InMemoryAccountLedger, InMemoryAssetRepository, InMemoryDappRepository,
        InMemoryTransferRepository, RecordingTransactionSubmitter,
    };

    struct Harness {
        table: ModuleTable,
        registry: Arc<DappRegistry>,
        transfers: Arc<InMemoryTransferRepository>,
        assets: Arc<InMemoryAssetRepository>,
        balances: Arc<BalanceCache>,
        submitter: Arc<RecordingTransactionSubmitter>,
    }

    async fn harness() -> Harness {
        let dapps = Arc::new(InMemoryDappRepository::new());
        dapps
            .save(&DappRecord {
                transaction_id: "d1".into(),
                name: "app".into(),
                description: None,
                tags: None,
                link: None,
                icon: None,
                category: 0,
                dapp_type: 0,
                author_id: "1000".into(),
                block_id: Some("b5".into()),
                block_height: Some(5),
            })
            .await
            .unwrap();
        let accounts = Arc::new(InMemoryAccountLedger::new());
        accounts.insert(Account {
            multisignatures: vec!["aa".into(), "bb".into()],
            ..Account::new("1000")
        });
        let transfers = Arc::new(InMemoryTransferRepository::new());
        let assets = Arc::new(InMemoryAssetRepository::new());
        let balances = Arc::new(BalanceCache::new());
        let registry = Arc::new(DappRegistry::new());
        let submitter = Arc::new(RecordingTransactionSubmitter::new());

        let dapps_api = Arc::new(DappsSandboxApi::new(
            dapps,
            transfers.clone(),
            accounts,
            registry.clone(),
            submitter.clone(),
        ));
        let uia_api = Arc::new(UiaSandboxApi::new(assets.clone(), balances.clone()));
        Harness {
            table: module_table(dapps_api, uia_api),
            registry,
            transfers,
            assets,
            balances,
            submitter,
        }
    }

    async fn call(h: &Harness, name: &str, args: Value) -> Result<Value, String> {
        h.table
            .dispatch(SandboxCall {
                call: name.to_string(),
                args,
                application_id: "d1".to_string(),
            })
            .await
    }

    fn deposit(id: &str, height: u64) -> InTransferRecord {
        InTransferRecord {
            transaction_id: id.into(),
            dapp_id: "d1".into(),
            sender_id: "2000".into(),
            sender_public_key: "AB".repeat(32),
            amount: 7,
            height,
        }
    }

    #[tokio::test]
    async fn genesis_reports_point_author_and_associates() {
        let h = harness().await;
        let genesis = call(&h, "dapps#getGenesis", Value::Null).await.unwrap();
        assert_eq!(
            genesis,
            json!({
                "pointId": "b5",
                "pointHeight": 5,
                "authorId": "1000",
                "dappid": "d1",
                "associate": ["aa", "bb"],
            })
        );
    }

    #[tokio::test]
    async fn set_ready_marks_the_caller() {
        let h = harness().await;
        h.registry.attach_sandbox("d1", EchoHandle::new());
        assert!(!h.registry.is_ready("d1"));
        assert_eq!(call(&h, "dapps#setReady", Value::Null).await.unwrap(), json!({}));
        assert!(h.registry.is_ready("d1"));
    }

    #[tokio::test]
    async fn closed_modules_refuse_calls() {
        let h = harness().await;
        for module in CLOSED_MODULES {
            let err = call(&h, &format!("{}#anything", module), Value::Null).await.unwrap_err();
            assert_eq!(err, "This module doesn't have sandbox api");
        }
        let err = call(&h, "dapps#launch", Value::Null).await.unwrap_err();
        assert_eq!(err, "Method not found: dapps#launch");
    }

    #[tokio::test]
    async fn withdrawal_is_submitted_for_the_caller() {
        let h = harness().await;
        let body = json!({
            "secret": "s",
            "amount": 10,
            "recipientId": "12345",
            "transactionId": "ref-1"
        });
        let reply = call(&h, "dapps#sendWithdrawal", body).await.unwrap();
        let orders = h.submitter.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(reply["transactionId"], orders[0].0);
        assert_eq!(
            orders[0].1.asset,
            Asset::OutTransfer {
                dapp_id: "d1".into(),
                transaction_id: "ref-1".into()
            }
        );
    }

    #[tokio::test]
    async fn transfer_history_queries() {
        let h = harness().await;
        h.transfers.save_in_transfer(&deposit("t1", 3)).await.unwrap();
        h.transfers.save_in_transfer(&deposit("t2", 8)).await.unwrap();

        let common = call(&h, "dapps#getCommonBlock", Value::Null).await.unwrap();
        assert_eq!(common[0], json!({"height": 3, "id": "t1", "senderId": "2000", "amount": "7"}));

        let all = call(&h, "dapps#getBalanceTransactions", json!({})).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
        assert_eq!(all[0]["senderPublicKey"], "ab".repeat(32));

        let after = call(&h, "dapps#getBalanceTransactions", json!({"lastTransactionId": "t1"}))
            .await
            .unwrap();
        assert_eq!(after, json!([{"id": "t2", "senderPublicKey": "ab".repeat(32), "amount": 7}]));

        let unknown = call(&h, "dapps#getBalanceTransactions", json!({"lastTransactionId": "zz"}))
            .await
            .unwrap();
        assert_eq!(unknown, json!([]));

        assert_eq!(
            call(&h, "dapps#getWithdrawalLastTransaction", Value::Null).await.unwrap(),
            Value::Null
        );
        h.transfers
            .save_out_transfer(&OutTransferRecord {
                transaction_id: "o1".into(),
                dapp_id: "d1".into(),
                out_transaction_id: "ref-9".into(),
                recipient_id: "2000".into(),
                amount: 1,
                height: 9,
            })
            .await
            .unwrap();
        assert_eq!(
            call(&h, "dapps#getWithdrawalLastTransaction", Value::Null).await.unwrap(),
            json!({"id": "ref-9"})
        );
    }

    #[tokio::test]
    async fn uia_lookups() {
        let h = harness().await;
        h.assets
            .save_issuer(&Issuer {
                name: "ACME".into(),
                desc: "acme corp".into(),
                issuer_id: "1000".into(),
                transaction_id: "i1".into(),
            })
            .await
            .unwrap();
        h.assets
            .save_asset(&IssuedAsset {
                name: "ACME.GOLD".into(),
                desc: "gold".into(),
                maximum: 1_000_000,
                precision: 2,
                quantity: 500,
                strategy: String::new(),
                acl_mode: AclFlag::Blacklist,
                writeoff: false,
                allow_writeoff: true,
                allow_whitelist: false,
                allow_blacklist: true,
                issuer_name: "ACME".into(),
                transaction_id: "a1".into(),
            })
            .await
            .unwrap();
        h.balances
            .update(|book| book.credit(BalanceView::Confirmed, "2000", "ACME.GOLD", 250));

        assert_eq!(
            call(&h, "uia#getFee", Value::Null).await.unwrap()["fee"],
            5 * FIXED_POINT
        );
        let issuers = call(&h, "uia#getIssuers", json!({"limit": 10})).await.unwrap();
        assert_eq!(issuers["count"], 1);
        let by_address = call(&h, "uia#getIssuer", json!({"name": "1000"})).await.unwrap();
        assert_eq!(by_address["issuer"]["name"], "ACME");
        assert_eq!(
            call(&h, "uia#getIssuer", json!({"name": "NOPE"})).await.unwrap_err(),
            "Issuer not found"
        );

        let asset = call(&h, "uia#getAsset", json!({"name": "ACME.GOLD"})).await.unwrap();
        assert_eq!(asset["asset"]["maximum"], "1000000");
        assert_eq!(
            call(&h, "uia#getAsset", json!({"name": "ACME.SILVER"})).await.unwrap_err(),
            "Asset not found"
        );
        assert!(call(&h, "uia#getAssets", json!({"limit": 101}))
            .await
            .unwrap_err()
            .starts_with("Invalid parameters"));

        let balances = call(&h, "uia#getBalances", json!({"address": "2000"})).await.unwrap();
        assert_eq!(balances["count"], 1);
        assert_eq!(balances["balances"][0]["balance"], "250");
        let balance = call(&h, "uia#getBalance", json!({"address": "2000", "currency": "ACME.GOLD"}))
            .await
            .unwrap();
        assert_eq!(balance["balance"]["balance"], "250");
        assert_eq!(
            call(&h, "uia#getBalance", json!({"address": "2000", "currency": ""})).await.unwrap_err(),
            "Invalid currency"
        );
        assert_eq!(
            call(&h, "uia#getBalance", json!({"address": "2000", "currency": "ACME.SILVER"}))
                .await
                .unwrap_err(),
            "Balance info not found"
        );
        assert_eq!(
            call(&h, "uia#getBalances", json!({"address": "x!"})).await.unwrap_err(),
            "Invalid address"
        );
    }
}
