// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application registration (`Dapp`, type 5).

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use super::LedgerContext;
use crate::domain::asset_type::{row_str, row_u64, AssetTypeHandler, SerializationError, StorageRow, TransactionError};
use crate::domain::dapp::{
    find_duplicate_tag, has_extension, is_uri, DappCategory, DappRecord, MAX_DAPP_TYPE,
    MAX_DESCRIPTION_LEN, MAX_NAME_LEN, MAX_NORMALIZED_LINK_LEN, MAX_TAGS_LEN,
    MAX_VERIFIED_LINK_LEN,
};
use crate::domain::events::DappEvent;
use crate::domain::reservation::KeySpace;
use crate::domain::transaction::{Account, Asset, Block, CreateData, DappAsset, Transaction, TransactionType, FIXED_POINT};

pub const REGISTER_FEE: u64 = 100 * FIXED_POINT;

const ICON_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct DappRegisterHandler {
    ctx: LedgerContext,
}

impl DappRegisterHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<&DappAsset, SerializationError> {
        match &tx.asset {
            Asset::Dapp(dapp) => Ok(dapp),
            _ => Err(SerializationError::MissingAsset("dapp")),
        }
    }

    fn verify_fields(tx: &Transaction, dapp: &DappAsset) -> Result<(), TransactionError> {
        if tx.recipient_id.is_some() {
            return Err(TransactionError::validation("Invalid recipient"));
        }
        if tx.amount != 0 {
            return Err(TransactionError::validation("Invalid transaction amount"));
        }
        if DappCategory::from_code(dapp.category).is_none() {
            return Err(TransactionError::validation("Unknown dapp category"));
        }

        if let Some(icon) = dapp.icon.as_deref().filter(|icon| !icon.is_empty()) {
            if !is_uri(icon) {
                return Err(TransactionError::validation("Invalid icon link"));
            }
            if !has_extension(icon, ICON_EXTENSIONS) {
                return Err(TransactionError::validation("Invalid icon file type"));
            }
            if icon.chars().count() > MAX_VERIFIED_LINK_LEN {
                return Err(TransactionError::validation(
                    "Dapp icon url is too long. Maximum is 160 characters",
                ));
            }
        }

        if dapp.dapp_type > MAX_DAPP_TYPE {
            return Err(TransactionError::validation("Invalid dapp type"));
        }

        let link = dapp.link.as_deref().unwrap_or_default();
        if !is_uri(link) {
            return Err(TransactionError::validation("Invalid dapp link"));
        }
        if !has_extension(link, &["zip"]) {
            return Err(TransactionError::validation("Invalid dapp file type"));
        }
        if link.chars().count() > MAX_VERIFIED_LINK_LEN {
            return Err(TransactionError::validation(
                "Dapp link is too long. Maximum is 160 characters",
            ));
        }

        if dapp.name.trim().is_empty() || dapp.name.trim() != dapp.name {
            return Err(TransactionError::validation("Missing dapp name"));
        }
        if dapp.name.chars().count() > MAX_NAME_LEN {
            return Err(TransactionError::validation(
                "Dapp name is too long. Maximum is 32 characters",
            ));
        }
        if dapp
            .description
            .as_deref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(TransactionError::validation(
                "Dapp description is too long. Maximum is 160 characters",
            ));
        }
        if let Some(tags) = dapp.tags.as_deref().filter(|t| !t.is_empty()) {
            if tags.chars().count() > MAX_TAGS_LEN {
                return Err(TransactionError::validation(
                    "Dapp tags is too long. Maximum is 160 characters",
                ));
            }
            if let Some(tag) = find_duplicate_tag(tags) {
                return Err(TransactionError::validation(format!(
                    "Encountered duplicate tags: {}",
                    tag
                )));
            }
        }
        Ok(())
    }

    async fn check_confirmed_duplicate(&self, tx: &Transaction, dapp: &DappAsset) -> Result<(), TransactionError> {
        let rows = self
            .ctx
            .dapps
            .find_conflicting(&dapp.name, dapp.link.as_deref(), &tx.id)
            .await
            .map_err(|e| {
                error!(error = %e, transaction_id = %tx.id, "Dapp uniqueness lookup failed");
                TransactionError::validation("Database error")
            })?;

        match rows.first() {
            None => Ok(()),
            Some(existing) if existing.name == dapp.name => Err(TransactionError::Conflict(format!(
                "Dapp name already exists: {}",
                existing.name
            ))),
            Some(existing) if existing.link.is_some() && existing.link == dapp.link => {
                Err(TransactionError::Conflict(format!(
                    "Dapp link already exists: {}",
                    existing.link.as_deref().unwrap_or_default()
                )))
            }
            Some(_) => Err(TransactionError::validation("Unknown error")),
        }
    }

    fn normalization_error(detail: impl std::fmt::Display) -> TransactionError {
        TransactionError::Normalization(format!(
            "Can't verify dapp new transaction, Invalid parameters: {}",
            detail
        ))
    }
}

#[async_trait]
impl AssetTypeHandler for DappRegisterHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Dapp
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let Asset::Dapp(dapp) = data.asset else {
            return Err(TransactionError::validation("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = 0;
        tx.asset = Asset::Dapp(dapp);
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        REGISTER_FEE
    }

    async fn verify(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let dapp = Self::payload(tx)?;
        Self::verify_fields(tx, dapp)?;
        self.check_confirmed_duplicate(tx, dapp).await
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let dapp = Self::payload(tx)?;
        let mut bytes = dapp.name.as_bytes().to_vec();
        for field in [&dapp.description, &dapp.tags, &dapp.link, &dapp.icon] {
            if let Some(value) = field {
                bytes.extend_from_slice(value.as_bytes());
            }
        }
        bytes.extend_from_slice(&i32::from(dapp.dapp_type).to_le_bytes());
        bytes.extend_from_slice(&i32::from(dapp.category).to_le_bytes());
        Ok(bytes)
    }

    async fn apply(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo(&self, _tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn apply_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let dapp = Self::payload(tx)?;
        let mut claims = vec![(KeySpace::DappName, dapp.name.as_str())];
        if let Some(link) = dapp.link.as_deref() {
            claims.push((KeySpace::DappLink, link));
        }
        self.ctx.reservations.reserve_all(&claims).map_err(|conflict| {
            let label = match conflict.space {
                KeySpace::DappLink => "link",
                _ => "name",
            };
            TransactionError::Conflict(format!("Dapp {} already exists: {}", label, conflict.key))
        })
    }

    async fn undo_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let dapp = Self::payload(tx)?;
        self.ctx.reservations.release(KeySpace::DappName, &dapp.name);
        if let Some(link) = dapp.link.as_deref() {
            self.ctx.reservations.release(KeySpace::DappLink, link);
        }
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let Asset::Dapp(dapp) = &tx.asset else {
            return Err(Self::normalization_error("missing dapp asset"));
        };
        if DappCategory::from_code(dapp.category).is_none() {
            return Err(Self::normalization_error("category must be between 0 and 8"));
        }
        let name_len = dapp.name.chars().count();
        if !(1..=MAX_NAME_LEN).contains(&name_len) {
            return Err(Self::normalization_error("name length must be between 1 and 32"));
        }
        let bounded = [
            ("description", &dapp.description, MAX_DESCRIPTION_LEN),
            ("tags", &dapp.tags, MAX_TAGS_LEN),
            ("link", &dapp.link, MAX_NORMALIZED_LINK_LEN),
            ("icon", &dapp.icon, MAX_NORMALIZED_LINK_LEN),
        ];
        for (field, value, max) in bounded {
            if value.as_deref().is_some_and(|v| v.chars().count() > max) {
                return Err(Self::normalization_error(format!(
                    "{} must be at most {} characters",
                    field, max
                )));
            }
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        let Some(name) = row_str(row, "dapp_name") else {
            return Ok(None);
        };
        Ok(Some(Asset::Dapp(DappAsset {
            name,
            description: row_str(row, "dapp_description"),
            tags: row_str(row, "dapp_tags"),
            dapp_type: row_u64(row, "dapp_type").unwrap_or_default() as u8,
            link: row_str(row, "dapp_link"),
            category: row_u64(row, "dapp_category").unwrap_or_default() as u8,
            icon: row_str(row, "dapp_icon"),
        })))
    }

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let dapp = Self::payload(tx)?;
        let record = DappRecord {
            transaction_id: tx.id.clone(),
            name: dapp.name.clone(),
            description: dapp.description.clone(),
            tags: dapp.tags.clone(),
            link: dapp.link.clone(),
            icon: dapp.icon.clone(),
            category: dapp.category,
            dapp_type: dapp.dapp_type,
            author_id: tx.sender_id.clone(),
            block_id: tx.block_id.clone(),
            block_height: tx.block_height,
        };
        self.ctx.dapps.save(&record).await?;

        info!(dapp_id = %record.transaction_id, name = %record.name, "Dapp registered");
        self.ctx.event_bus.publish_dapp_event(DappEvent::Registered {
            dapp_id: record.transaction_id,
            name: record.name,
            registered_at: Utc::now(),
        });
        Ok(())
    }
}
