// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # User-Issued Asset Handlers (types 9-14)
//!
//! | Type | Handler | Fee |
//! |------|---------|-----|
//! | `UiaIssuer` | [`IssuerRegisterHandler`] | 100 |
//! | `UiaAsset` | [`AssetRegisterHandler`] | 500 |
//! | `UiaFlags` | [`AssetFlagsHandler`] | 0.1 |
//! | `UiaAcl` | [`AssetAclHandler`] | 0.2 |
//! | `UiaIssue` | [`AssetIssueHandler`] | 0.1 |
//! | `UiaTransfer` | [`AssetTransferHandler`] | 0.1 |
//!
//! Amounts travel as decimal strings in the asset's smallest unit and are
//! parsed to `u128`. Balance changes are made inside one
//! [`BalanceCache::update`](crate::domain::uia::BalanceCache::update) call so a
//! multi-key change commits atomically.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use super::LedgerContext;
use crate::domain::address::is_address;
use crate::domain::asset_type::{row_str, row_u64, AssetTypeHandler, SerializationError, StorageRow, TransactionError};
use crate::domain::reservation::KeySpace;
use crate::domain::transaction::{
    Account, Asset, Block, CreateData, Transaction, TransactionType, UiaAssetPayload, FIXED_POINT,
};
use crate::domain::uia::{
    is_issuer_name, parse_amount, split_asset_name, AclFlag, BalanceView, FlagType,
    InsufficientBalance, IssuedAsset, Issuer, MAX_ACL_BATCH, MAX_CURRENCY_LEN, MAX_ISSUER_DESC_LEN,
    MAX_PRECISION,
};

pub const ISSUER_FEE: u64 = 100 * FIXED_POINT;
pub const ASSET_FEE: u64 = 500 * FIXED_POINT;
pub const FLAGS_FEE: u64 = FIXED_POINT / 10;
pub const ACL_FEE: u64 = FIXED_POINT / 5;
pub const ISSUE_FEE: u64 = FIXED_POINT / 10;
pub const UIA_TRANSFER_FEE: u64 = FIXED_POINT / 10;

const MAX_STRATEGY_LEN: usize = 256;

/// Every issued-asset handler, ready for registration.
pub fn handlers(ctx: LedgerContext) -> Vec<Arc<dyn AssetTypeHandler>> {
    vec![
        Arc::new(IssuerRegisterHandler::new(ctx.clone())),
        Arc::new(AssetRegisterHandler::new(ctx.clone())),
        Arc::new(AssetFlagsHandler::new(ctx.clone())),
        Arc::new(AssetAclHandler::new(ctx.clone())),
        Arc::new(AssetIssueHandler::new(ctx.clone())),
        Arc::new(AssetTransferHandler::new(ctx)),
    ]
}

fn invalid(message: impl Into<String>) -> TransactionError {
    TransactionError::Validation(message.into())
}

/// Issued-asset operations other than transfers carry no recipient or coin amount.
fn ensure_plain(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.recipient_id.is_some() {
        return Err(invalid("Invalid recipient"));
    }
    if tx.amount != 0 {
        return Err(invalid("Invalid transaction amount"));
    }
    Ok(())
}

fn normalization(detail: &str) -> TransactionError {
    TransactionError::Normalization(format!("Invalid uia transaction parameters: {}", detail))
}

async fn load_asset(ctx: &LedgerContext, currency: &str) -> Result<IssuedAsset, TransactionError> {
    ctx.assets
        .find_asset(currency)
        .await?
        .ok_or_else(|| TransactionError::NotFound("Asset not exists".to_string()))
}

async fn ensure_issuer(ctx: &LedgerContext, asset: &IssuedAsset, sender_id: &str) -> Result<(), TransactionError> {
    match ctx.assets.find_issuer_by_name(&asset.issuer_name).await? {
        Some(issuer) if issuer.issuer_id == sender_id => Ok(()),
        _ => Err(invalid("Permission not allowed")),
    }
}

fn amount_of(amount: &str) -> Result<u128, TransactionError> {
    parse_amount(amount).ok_or_else(|| invalid("Invalid amount"))
}

fn insufficient(_: InsufficientBalance) -> TransactionError {
    TransactionError::Ledger("Insufficient asset balance".to_string())
}

// ---------------------------------------------------------------------------
// Issuer registration
// ---------------------------------------------------------------------------

pub struct IssuerRegisterHandler {
    ctx: LedgerContext,
}

impl IssuerRegisterHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<(&str, &str), SerializationError> {
        match &tx.asset {
            Asset::UiaIssuer { name, desc } => Ok((name, desc)),
            _ => Err(SerializationError::MissingAsset("uiaIssuer")),
        }
    }
}

#[async_trait]
impl AssetTypeHandler for IssuerRegisterHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaIssuer
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaIssuer { .. } = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        ISSUER_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        ensure_plain(tx)?;
        let (name, desc) = Self::payload(tx)?;
        if !is_issuer_name(name) {
            return Err(invalid("Invalid issuer name"));
        }
        if desc.len() > MAX_ISSUER_DESC_LEN {
            return Err(invalid("Invalid issuer description"));
        }
        if self.ctx.assets.find_issuer_by_name(name).await?.is_some() {
            return Err(TransactionError::Conflict("Issuer name already exists".to_string()));
        }
        if self.ctx.assets.find_issuer_by_address(&sender.address).await?.is_some() {
            return Err(TransactionError::Conflict("Issuer already exists".to_string()));
        }
        Ok(())
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let (name, desc) = Self::payload(tx)?;
        Ok([name.as_bytes(), desc.as_bytes()].concat())
    }

    async fn apply(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn apply_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let (name, _) = Self::payload(tx)?;
        self.ctx
            .reservations
            .reserve_all(&[
                (KeySpace::IssuerName, name),
                (KeySpace::IssuerAddress, sender.address.as_str()),
            ])
            .map_err(|conflict| match conflict.space {
                KeySpace::IssuerName => TransactionError::Conflict("Issuer name already exists".to_string()),
                _ => TransactionError::Conflict("Issuer address already exists".to_string()),
            })
    }

    async fn undo_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let (name, _) = Self::payload(tx)?;
        self.ctx.reservations.release(KeySpace::IssuerName, name);
        self.ctx.reservations.release(KeySpace::IssuerAddress, &sender.address);
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let (name, desc) = Self::payload(tx).map_err(|_| normalization("issuer asset is required"))?;
        if name.is_empty() || name.len() > 16 {
            return Err(normalization("name length must be between 1 and 16"));
        }
        if desc.len() > MAX_ISSUER_DESC_LEN {
            return Err(normalization("desc is too long"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "issuers_name").map(|name| Asset::UiaIssuer {
            name,
            desc: row_str(row, "issuers_desc").unwrap_or_default(),
        }))
    }

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let (name, desc) = Self::payload(tx)?;
        self.ctx
            .assets
            .save_issuer(&Issuer {
                name: name.to_string(),
                desc: desc.to_string(),
                issuer_id: tx.sender_id.clone(),
                transaction_id: tx.id.clone(),
            })
            .await?;
        info!(issuer = %name, address = %tx.sender_id, "Issuer registered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Asset registration
// ---------------------------------------------------------------------------

pub struct AssetRegisterHandler {
    ctx: LedgerContext,
}

impl AssetRegisterHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<&UiaAssetPayload, SerializationError> {
        match &tx.asset {
            Asset::UiaAsset(payload) => Ok(payload),
            _ => Err(SerializationError::MissingAsset("uiaAsset")),
        }
    }
}

#[async_trait]
impl AssetTypeHandler for AssetRegisterHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaAsset
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaAsset(_) = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        ASSET_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        ensure_plain(tx)?;
        let payload = Self::payload(tx)?;
        let (issuer_name, _) =
            split_asset_name(&payload.name).ok_or_else(|| invalid("Invalid asset full name"))?;
        if payload.desc.len() > MAX_ISSUER_DESC_LEN {
            return Err(invalid("Invalid asset description"));
        }
        if parse_amount(&payload.maximum).is_none() {
            return Err(invalid("Invalid asset maximum"));
        }
        if payload.precision > MAX_PRECISION {
            return Err(invalid("Invalid asset precision"));
        }
        if payload.strategy.len() > MAX_STRATEGY_LEN {
            return Err(invalid("Invalid asset strategy"));
        }

        match self.ctx.assets.find_issuer_by_name(issuer_name).await? {
            None => return Err(TransactionError::NotFound("Issuer not exists".to_string())),
            Some(issuer) if issuer.issuer_id != sender.address => {
                return Err(invalid("Permission not allowed"))
            }
            Some(_) => {}
        }
        if self.ctx.assets.find_asset(&payload.name).await?.is_some() {
            return Err(TransactionError::Conflict("Asset already exists".to_string()));
        }
        Ok(())
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let payload = Self::payload(tx)?;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(payload.name.as_bytes());
        bytes.extend_from_slice(payload.desc.as_bytes());
        bytes.extend_from_slice(payload.maximum.as_bytes());
        bytes.push(payload.precision);
        bytes.extend_from_slice(payload.strategy.as_bytes());
        bytes.extend([
            u8::from(payload.allow_writeoff),
            u8::from(payload.allow_whitelist),
            u8::from(payload.allow_blacklist),
        ]);
        Ok(bytes)
    }

    async fn apply(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn apply_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let payload = Self::payload(tx)?;
        self.ctx
            .reservations
            .reserve(KeySpace::AssetName, &payload.name)
            .map_err(|_| TransactionError::Conflict("Asset already exists".to_string()))
    }

    async fn undo_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let payload = Self::payload(tx)?;
        self.ctx.reservations.release(KeySpace::AssetName, &payload.name);
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let payload = Self::payload(tx).map_err(|_| normalization("asset payload is required"))?;
        if payload.name.is_empty() || payload.name.len() > MAX_CURRENCY_LEN {
            return Err(normalization("name length must be between 1 and 22"));
        }
        if payload.maximum.is_empty() || payload.maximum.len() > 32 {
            return Err(normalization("maximum length must be between 1 and 32"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        let Some(name) = row_str(row, "assets_name") else {
            return Ok(None);
        };
        let flag = |column: &str| row_u64(row, column).unwrap_or_default() != 0;
        Ok(Some(Asset::UiaAsset(UiaAssetPayload {
            name,
            desc: row_str(row, "assets_desc").unwrap_or_default(),
            maximum: row_str(row, "assets_maximum").unwrap_or_default(),
            precision: row_u64(row, "assets_precision").unwrap_or_default() as u8,
            strategy: row_str(row, "assets_strategy").unwrap_or_default(),
            allow_writeoff: flag("assets_allowWriteoff"),
            allow_whitelist: flag("assets_allowWhitelist"),
            allow_blacklist: flag("assets_allowBlacklist"),
        })))
    }

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let payload = Self::payload(tx)?;
        let (issuer_name, _) =
            split_asset_name(&payload.name).ok_or_else(|| invalid("Invalid asset full name"))?;
        let asset = IssuedAsset {
            name: payload.name.clone(),
            desc: payload.desc.clone(),
            maximum: amount_of(&payload.maximum)?,
            precision: payload.precision,
            quantity: 0,
            strategy: payload.strategy.clone(),
            acl_mode: AclFlag::Blacklist,
            writeoff: false,
            allow_writeoff: payload.allow_writeoff,
            allow_whitelist: payload.allow_whitelist,
            allow_blacklist: payload.allow_blacklist,
            issuer_name: issuer_name.to_string(),
            transaction_id: tx.id.clone(),
        };
        self.ctx.assets.save_asset(&asset).await?;
        info!(asset = %asset.name, "Asset registered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flags update
// ---------------------------------------------------------------------------

pub struct AssetFlagsHandler {
    ctx: LedgerContext,
}

struct FlagsPayload<'a> {
    currency: &'a str,
    flag_type: u8,
    flag: u8,
}

impl AssetFlagsHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<FlagsPayload<'_>, SerializationError> {
        match &tx.asset {
            Asset::UiaFlags {
                currency,
                flag_type,
                flag,
            } => Ok(FlagsPayload {
                currency,
                flag_type: *flag_type,
                flag: *flag,
            }),
            _ => Err(SerializationError::MissingAsset("uiaFlags")),
        }
    }

    /// Write the flag (`forward`) or restore the value it replaced.
    async fn set_flag(&self, tx: &Transaction, forward: bool) -> Result<(), TransactionError> {
        let payload = Self::payload(tx)?;
        let mut asset = load_asset(&self.ctx, payload.currency).await?;
        match FlagType::try_from(payload.flag_type).map_err(invalid)? {
            FlagType::AclMode => {
                let mode = AclFlag::try_from(payload.flag).map_err(invalid)?;
                asset.acl_mode = if forward {
                    mode
                } else {
                    match mode {
                        AclFlag::Blacklist => AclFlag::Whitelist,
                        AclFlag::Whitelist => AclFlag::Blacklist,
                    }
                };
            }
            FlagType::Writeoff => asset.writeoff = forward,
        }
        self.ctx.assets.save_asset(&asset).await?;
        Ok(())
    }
}

#[async_trait]
impl AssetTypeHandler for AssetFlagsHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaFlags
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaFlags { .. } = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        FLAGS_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        ensure_plain(tx)?;
        let payload = Self::payload(tx)?;
        let flag_type = FlagType::try_from(payload.flag_type).map_err(invalid)?;
        let asset = load_asset(&self.ctx, payload.currency).await?;
        ensure_issuer(&self.ctx, &asset, &sender.address).await?;
        if asset.writeoff {
            return Err(invalid("Asset already writeoff"));
        }
        match flag_type {
            FlagType::AclMode => {
                let mode = AclFlag::try_from(payload.flag).map_err(|_| invalid("Invalid acl flag"))?;
                if mode == asset.acl_mode {
                    return Err(invalid("Flag double set"));
                }
                let allowed = match mode {
                    AclFlag::Whitelist => asset.allow_whitelist,
                    AclFlag::Blacklist => asset.allow_blacklist,
                };
                if !allowed {
                    return Err(invalid("Acl mode not allowed"));
                }
            }
            FlagType::Writeoff => {
                if !asset.allow_writeoff {
                    return Err(invalid("Writeoff not allowed"));
                }
                if payload.flag != 1 {
                    return Err(invalid("Invalid writeoff flag"));
                }
            }
        }
        Ok(())
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let payload = Self::payload(tx)?;
        let mut bytes = payload.currency.as_bytes().to_vec();
        bytes.extend([payload.flag_type, payload.flag]);
        Ok(bytes)
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.set_flag(tx, true).await
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.set_flag(tx, false).await
    }

    async fn apply_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let payload = Self::payload(tx).map_err(|_| normalization("flags payload is required"))?;
        if payload.currency.is_empty() {
            return Err(normalization("currency is required"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "flags_currency").map(|currency| Asset::UiaFlags {
            currency,
            flag_type: row_u64(row, "flags_flagType").unwrap_or_default() as u8,
            flag: row_u64(row, "flags_flag").unwrap_or_default() as u8,
        }))
    }

    async fn save_to_storage(&self, _tx: &Transaction) -> Result<(), TransactionError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ACL update
// ---------------------------------------------------------------------------

pub struct AssetAclHandler {
    ctx: LedgerContext,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum AclOperator {
    Add,
    Remove,
}

struct AclPayload<'a> {
    currency: &'a str,
    operator: &'a str,
    flag: u8,
    list: &'a [String],
}

impl AssetAclHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<AclPayload<'_>, SerializationError> {
        match &tx.asset {
            Asset::UiaAcl {
                currency,
                operator,
                flag,
                list,
            } => Ok(AclPayload {
                currency,
                operator,
                flag: *flag,
                list,
            }),
            _ => Err(SerializationError::MissingAsset("uiaAcl")),
        }
    }

    fn operator(raw: &str) -> Result<AclOperator, TransactionError> {
        match raw {
            "+" => Ok(AclOperator::Add),
            "-" => Ok(AclOperator::Remove),
            _ => Err(invalid("Invalid acl operator")),
        }
    }

    async fn update(&self, tx: &Transaction, forward: bool) -> Result<(), TransactionError> {
        let payload = Self::payload(tx)?;
        let flag = AclFlag::try_from(payload.flag).map_err(invalid)?;
        let add = (Self::operator(payload.operator)? == AclOperator::Add) == forward;
        if add {
            self.ctx.assets.acl_add(payload.currency, flag, payload.list).await?;
        } else {
            self.ctx.assets.acl_remove(payload.currency, flag, payload.list).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AssetTypeHandler for AssetAclHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaAcl
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaAcl { .. } = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        ACL_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        ensure_plain(tx)?;
        let payload = Self::payload(tx)?;
        let operator = Self::operator(payload.operator)?;
        let flag = AclFlag::try_from(payload.flag).map_err(|_| invalid("Invalid acl flag"))?;
        if payload.list.is_empty() || payload.list.len() > MAX_ACL_BATCH {
            return Err(invalid("Invalid acl list"));
        }
        let mut seen = HashSet::new();
        for address in payload.list {
            if !is_address(address) {
                return Err(invalid("Acl contains invalid address"));
            }
            if !seen.insert(address.as_str()) {
                return Err(invalid("Acl contains duplicated address"));
            }
        }

        let asset = load_asset(&self.ctx, payload.currency).await?;
        ensure_issuer(&self.ctx, &asset, &sender.address).await?;

        for address in payload.list {
            let listed = self.ctx.assets.acl_contains(payload.currency, flag, address).await?;
            match operator {
                AclOperator::Add if listed => {
                    return Err(invalid(format!("Address already in acl: {}", address)))
                }
                AclOperator::Remove if !listed => {
                    return Err(invalid(format!("Address not in acl: {}", address)))
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let payload = Self::payload(tx)?;
        let mut bytes = payload.currency.as_bytes().to_vec();
        bytes.extend_from_slice(payload.operator.as_bytes());
        bytes.push(payload.flag);
        bytes.extend_from_slice(payload.list.join("").as_bytes());
        Ok(bytes)
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.update(tx, true).await
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.update(tx, false).await
    }

    async fn apply_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let payload = Self::payload(tx).map_err(|_| normalization("acl payload is required"))?;
        if payload.currency.is_empty() || payload.operator.len() != 1 {
            return Err(normalization("currency and operator are required"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "acls_currency").map(|currency| Asset::UiaAcl {
            currency,
            operator: row_str(row, "acls_operator").unwrap_or_default(),
            flag: row_u64(row, "acls_flag").unwrap_or_default() as u8,
            list: row_str(row, "acls_list")
                .map(|list| list.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        }))
    }

    async fn save_to_storage(&self, _tx: &Transaction) -> Result<(), TransactionError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

pub struct AssetIssueHandler {
    ctx: LedgerContext,
}

impl AssetIssueHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<(&str, &str), SerializationError> {
        match &tx.asset {
            Asset::UiaIssue { currency, amount } => Ok((currency, amount)),
            _ => Err(SerializationError::MissingAsset("uiaIssue")),
        }
    }
}

#[async_trait]
impl AssetTypeHandler for AssetIssueHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaIssue
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaIssue { .. } = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        ISSUE_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        ensure_plain(tx)?;
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        let asset = load_asset(&self.ctx, currency).await?;
        ensure_issuer(&self.ctx, &asset, &sender.address).await?;
        if asset.writeoff {
            return Err(invalid("Asset already writeoff"));
        }
        match asset.quantity.checked_add(amount) {
            Some(total) if total <= asset.maximum => Ok(()),
            _ => Err(invalid("Exceed issue limit")),
        }
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let (currency, amount) = Self::payload(tx)?;
        Ok([currency.as_bytes(), amount.as_bytes()].concat())
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        let mut asset = load_asset(&self.ctx, currency).await?;
        asset.quantity = asset
            .quantity
            .checked_add(amount)
            .ok_or_else(|| invalid("Exceed issue limit"))?;
        self.ctx.assets.save_asset(&asset).await?;
        self.ctx.balances.update(|book| {
            book.credit(BalanceView::Confirmed, &tx.sender_id, currency, amount);
            book.credit(BalanceView::Unconfirmed, &tx.sender_id, currency, amount);
        });
        Ok(())
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        let mut asset = load_asset(&self.ctx, currency).await?;
        self.ctx
            .balances
            .update(|book| {
                let unconfirmed = book.balance(BalanceView::Unconfirmed, &tx.sender_id, currency);
                if unconfirmed < amount {
                    return Err(InsufficientBalance);
                }
                book.debit(BalanceView::Confirmed, &tx.sender_id, currency, amount)?;
                book.debit(BalanceView::Unconfirmed, &tx.sender_id, currency, amount)
            })
            .map_err(insufficient)?;
        asset.quantity = asset.quantity.saturating_sub(amount);
        self.ctx.assets.save_asset(&asset).await?;
        Ok(())
    }

    async fn apply_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx).map_err(|_| normalization("issue payload is required"))?;
        if currency.is_empty() || amount.is_empty() {
            return Err(normalization("currency and amount are required"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "issues_currency").map(|currency| Asset::UiaIssue {
            currency,
            amount: row_str(row, "issues_amount").unwrap_or_default(),
        }))
    }

    async fn save_to_storage(&self, _tx: &Transaction) -> Result<(), TransactionError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

pub struct AssetTransferHandler {
    ctx: LedgerContext,
}

impl AssetTransferHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<(&str, &str), SerializationError> {
        match &tx.asset {
            Asset::UiaTransfer { currency, amount } => Ok((currency, amount)),
            _ => Err(SerializationError::MissingAsset("uiaTransfer")),
        }
    }

    fn recipient(tx: &Transaction) -> Result<&str, TransactionError> {
        tx.recipient_id
            .as_deref()
            .filter(|r| is_address(r))
            .ok_or_else(|| invalid("Invalid recipient"))
    }
}

#[async_trait]
impl AssetTypeHandler for AssetTransferHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::UiaTransfer
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::UiaTransfer { .. } = data.asset else {
            return Err(invalid("Invalid transaction asset"));
        };
        tx.recipient_id = data.recipient_id;
        tx.amount = 0;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        UIA_TRANSFER_FEE
    }

    async fn verify(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let recipient = Self::recipient(tx)?;
        if recipient == sender.address {
            return Err(invalid("Sender and recipient can't be the same"));
        }
        if tx.amount != 0 {
            return Err(invalid("Invalid transaction amount"));
        }
        let (currency, amount) = Self::payload(tx)?;
        if currency.is_empty() {
            return Err(invalid("Invalid currency"));
        }
        amount_of(amount)?;
        Ok(())
    }

    async fn process(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let (currency, _) = Self::payload(tx)?;
        let recipient = Self::recipient(tx)?;
        let asset = load_asset(&self.ctx, currency).await?;
        if asset.writeoff {
            return Err(invalid("Asset already writeoff"));
        }
        let assets = &self.ctx.assets;
        let sender_listed = assets.acl_contains(currency, asset.acl_mode, &sender.address).await?;
        let recipient_listed = assets.acl_contains(currency, asset.acl_mode, recipient).await?;
        let permitted = match asset.acl_mode {
            AclFlag::Blacklist => !sender_listed && !recipient_listed,
            AclFlag::Whitelist => sender_listed && recipient_listed,
        };
        if !permitted {
            return Err(invalid("Permission not allowed"));
        }
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let (currency, amount) = Self::payload(tx)?;
        Ok([currency.as_bytes(), amount.as_bytes()].concat())
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        let recipient = Self::recipient(tx)?;
        self.ctx
            .balances
            .update(|book| {
                book.debit(BalanceView::Confirmed, &tx.sender_id, currency, amount)?;
                book.credit(BalanceView::Confirmed, recipient, currency, amount);
                book.credit(BalanceView::Unconfirmed, recipient, currency, amount);
                Ok(())
            })
            .map_err(insufficient)
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        let recipient = Self::recipient(tx)?;
        self.ctx
            .balances
            .update(|book| {
                if book.balance(BalanceView::Unconfirmed, recipient, currency) < amount {
                    return Err(InsufficientBalance);
                }
                book.debit(BalanceView::Confirmed, recipient, currency, amount)?;
                book.debit(BalanceView::Unconfirmed, recipient, currency, amount)?;
                book.credit(BalanceView::Confirmed, &tx.sender_id, currency, amount);
                Ok(())
            })
            .map_err(insufficient)
    }

    async fn apply_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        self.ctx
            .balances
            .update(|book| book.debit(BalanceView::Unconfirmed, &sender.address, currency, amount))
            .map_err(insufficient)
    }

    async fn undo_unconfirmed(&self, tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        let (currency, amount) = Self::payload(tx)?;
        let amount = amount_of(amount)?;
        self.ctx
            .balances
            .update(|book| book.credit(BalanceView::Unconfirmed, &sender.address, currency, amount));
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let (currency, amount) =
            Self::payload(tx).map_err(|_| normalization("transfer payload is required"))?;
        if currency.is_empty() || currency.len() > MAX_CURRENCY_LEN {
            return Err(normalization("currency length must be between 1 and 22"));
        }
        if amount.is_empty() || amount.len() > 50 {
            return Err(normalization("amount length must be between 1 and 50"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "transfers_currency").map(|currency| Asset::UiaTransfer {
            currency,
            amount: row_str(row, "transfers_amount").unwrap_or_default(),
        }))
    }

    async fn save_to_storage(&self, _tx: &Transaction) -> Result<(), TransactionError> {
        Ok(())
    }
}
