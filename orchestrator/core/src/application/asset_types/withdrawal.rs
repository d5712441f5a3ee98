// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Withdrawal out of an application (`OutTransfer`, type 7).
//!
//! Each withdrawal references the dapp-side transaction that produced it. The
//! reference may be paid out once: the reservation index tracks it as
//! `InFlight` while an unconfirmed or unwound withdrawal holds it and as
//! `Settled` once confirmed.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{LedgerContext, TRANSFER_FEE};
use crate::domain::asset_type::{row_str, AssetTypeHandler, SerializationError, StorageRow, TransactionError};
use crate::domain::dapp::OutTransferRecord;
use crate::domain::reservation::WithdrawalMark;
use crate::domain::sandbox::SandboxNotification;
use crate::domain::transaction::{Account, Asset, Block, CreateData, Transaction, TransactionType};

pub struct WithdrawalHandler {
    ctx: LedgerContext,
}

struct OutTransferRef<'a> {
    dapp_id: &'a str,
    transaction_id: &'a str,
}

impl WithdrawalHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn payload(tx: &Transaction) -> Result<OutTransferRef<'_>, SerializationError> {
        match &tx.asset {
            Asset::OutTransfer {
                dapp_id,
                transaction_id,
            } => Ok(OutTransferRef {
                dapp_id,
                transaction_id,
            }),
            _ => Err(SerializationError::MissingAsset("outTransfer")),
        }
    }

    fn recipient(tx: &Transaction) -> Result<&str, TransactionError> {
        tx.recipient_id
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| TransactionError::validation("Invalid recipient"))
    }

    async fn credit_recipient(&self, tx: &Transaction, delta: i64) -> Result<(), TransactionError> {
        let recipient = Self::recipient(tx)?;
        self.ctx.accounts.merge(recipient, delta, delta).await?;
        Ok(())
    }
}

fn signed(amount: u64) -> Result<i64, TransactionError> {
    i64::try_from(amount).map_err(|_| TransactionError::validation("Invalid transaction amount"))
}

#[async_trait]
impl AssetTypeHandler for WithdrawalHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::OutTransfer
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let asset @ Asset::OutTransfer { .. } = data.asset else {
            return Err(TransactionError::validation("Invalid transaction asset"));
        };
        tx.recipient_id = data.recipient_id;
        tx.amount = data.amount;
        tx.asset = asset;
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        TRANSFER_FEE
    }

    async fn verify(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Self::recipient(tx)?;
        if tx.amount == 0 {
            return Err(TransactionError::validation("Invalid transaction amount"));
        }
        let out = Self::payload(tx)?;
        if out.dapp_id.is_empty() {
            return Err(TransactionError::validation("Invalid dapp id for out transfer"));
        }
        if out.transaction_id.is_empty() {
            return Err(TransactionError::validation("Invalid transaction id for out transfer"));
        }
        Ok(())
    }

    async fn process(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;

        let dapp_missing = || TransactionError::NotFound(format!("Dapp not found: {}", out.dapp_id));
        match self.ctx.dapps.exists(out.dapp_id).await {
            Ok(true) => {}
            Ok(false) => return Err(dapp_missing()),
            Err(e) => {
                error!(dapp_id = %out.dapp_id, error = %e, "Dapp lookup failed");
                return Err(dapp_missing());
            }
        }

        if self.ctx.reservations.withdrawal_state(out.transaction_id) == Some(WithdrawalMark::InFlight) {
            return Err(TransactionError::Conflict(format!(
                "Transaction is already processing: {}",
                out.transaction_id
            )));
        }

        let confirmed = || {
            TransactionError::Conflict(format!(
                "Transaction is already confirmed: {}",
                out.transaction_id
            ))
        };
        match self.ctx.transfers.out_transfer_exists(out.transaction_id).await {
            Ok(false) => Ok(()),
            Ok(true) => Err(confirmed()),
            Err(e) => {
                error!(reference = %out.transaction_id, error = %e, "Withdrawal lookup failed");
                Err(confirmed())
            }
        }
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        let out = Self::payload(tx)?;
        let mut bytes = out.dapp_id.as_bytes().to_vec();
        bytes.extend_from_slice(out.transaction_id.as_bytes());
        Ok(bytes)
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;
        self.credit_recipient(tx, signed(tx.amount)?).await?;
        self.ctx.reservations.mark_settled(out.transaction_id, &tx.id);
        Ok(())
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;
        self.credit_recipient(tx, -signed(tx.amount)?).await?;
        self.ctx.reservations.mark_unsettled(out.transaction_id, &tx.id);
        Ok(())
    }

    async fn apply_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;
        match self.ctx.reservations.claim_withdrawal(out.transaction_id, &tx.id) {
            Ok(()) => Ok(()),
            Err(WithdrawalMark::InFlight) => Err(TransactionError::Conflict(format!(
                "Transaction is already processing: {}",
                out.transaction_id
            ))),
            Err(WithdrawalMark::Settled) => Err(TransactionError::Conflict(format!(
                "Transaction is already confirmed: {}",
                out.transaction_id
            ))),
        }
    }

    async fn undo_unconfirmed(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;
        if !self.ctx.reservations.release_withdrawal(out.transaction_id, &tx.id) {
            debug!(reference = %out.transaction_id, transaction_id = %tx.id, "Withdrawal reference not held");
        }
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        let invalid = |detail: &str| {
            TransactionError::Normalization(format!(
                "Unable to verify dapp out transaction, invalid parameters: {}",
                detail
            ))
        };
        let out = Self::payload(tx).map_err(|_| invalid("asset is required"))?;
        if out.dapp_id.is_empty() {
            return Err(invalid("dappId is required"));
        }
        if out.transaction_id.is_empty() {
            return Err(invalid("transactionId is required"));
        }
        Ok(())
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        let Some(dapp_id) = row_str(row, "ot_dappId") else {
            return Ok(None);
        };
        Ok(Some(Asset::OutTransfer {
            dapp_id,
            transaction_id: row_str(row, "ot_outTransactionId").unwrap_or_default(),
        }))
    }

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let out = Self::payload(tx)?;
        let record = OutTransferRecord {
            transaction_id: tx.id.clone(),
            dapp_id: out.dapp_id.to_string(),
            out_transaction_id: out.transaction_id.to_string(),
            recipient_id: tx.recipient_id.clone().unwrap_or_default(),
            amount: tx.amount,
            height: tx.block_height.unwrap_or_default(),
        };
        self.ctx.transfers.save_out_transfer(&record).await?;
        info!(dapp_id = %record.dapp_id, transaction_id = %record.transaction_id, "Withdrawal confirmed");

        let notification = SandboxNotification::Withdrawal {
            transaction_id: tx.id.clone(),
        };
        if let Err(e) = self.ctx.notifier.notify(out.dapp_id, notification).await {
            warn!(dapp_id = %out.dapp_id, error = %e, "Failed to notify dapp of withdrawal");
        }
        Ok(())
    }
}
