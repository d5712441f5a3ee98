// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deposit into an application (`InTransfer`, type 6).
//!
//! Confirmed deposits credit the registration author's account; the dapp
//! itself learns about them through `dapps#getBalanceTransactions`.

use async_trait::async_trait;
use tracing::{debug, error};

use super::{LedgerContext, TRANSFER_FEE};
use crate::domain::asset_type::{row_str, AssetTypeHandler, SerializationError, StorageRow, TransactionError};
use crate::domain::dapp::InTransferRecord;
use crate::domain::transaction::{Account, Asset, Block, CreateData, Transaction, TransactionType};

pub struct DepositHandler {
    ctx: LedgerContext,
}

impl DepositHandler {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    fn dapp_id(tx: &Transaction) -> Result<&str, SerializationError> {
        match &tx.asset {
            Asset::InTransfer { dapp_id } => Ok(dapp_id),
            _ => Err(SerializationError::MissingAsset("inTransfer")),
        }
    }

    /// Author of the registration the deposit targets.
    async fn genesis_author(&self, dapp_id: &str) -> Result<String, TransactionError> {
        self.ctx
            .dapps
            .find_by_id(dapp_id)
            .await?
            .map(|record| record.author_id)
            .ok_or_else(|| TransactionError::NotFound(format!("Dapp not found: {}", dapp_id)))
    }

    async fn credit_author(&self, tx: &Transaction, delta: i64) -> Result<(), TransactionError> {
        let dapp_id = Self::dapp_id(tx)?;
        let author = self.genesis_author(dapp_id).await?;
        self.ctx.accounts.merge(&author, delta, delta).await?;
        debug!(dapp_id = %dapp_id, author = %author, delta, "Deposit applied to dapp author");
        Ok(())
    }
}

fn signed(amount: u64) -> Result<i64, TransactionError> {
    i64::try_from(amount).map_err(|_| TransactionError::validation("Invalid transaction amount"))
}

#[async_trait]
impl AssetTypeHandler for DepositHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::InTransfer
    }

    fn create(&self, data: CreateData, mut tx: Transaction) -> Result<Transaction, TransactionError> {
        let Asset::InTransfer { dapp_id } = data.asset else {
            return Err(TransactionError::validation("Invalid transaction asset"));
        };
        tx.recipient_id = None;
        tx.amount = data.amount;
        tx.asset = Asset::InTransfer { dapp_id };
        Ok(tx)
    }

    fn calculate_fee(&self, _tx: &Transaction, _sender: &Account) -> u64 {
        TRANSFER_FEE
    }

    async fn verify(&self, tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        if tx.recipient_id.is_some() {
            return Err(TransactionError::validation("Invalid recipient"));
        }
        if tx.amount == 0 {
            return Err(TransactionError::validation("Invalid transaction amount"));
        }
        let dapp_id = Self::dapp_id(tx)?;
        let not_found = || TransactionError::NotFound(format!("Dapp not found: {}", dapp_id));
        match self.ctx.dapps.exists(dapp_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(not_found()),
            Err(e) => {
                error!(dapp_id = %dapp_id, error = %e, "Dapp lookup failed");
                Err(not_found())
            }
        }
    }

    async fn process(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn get_bytes(&self, tx: &Transaction) -> Result<Vec<u8>, SerializationError> {
        Ok(Self::dapp_id(tx)?.as_bytes().to_vec())
    }

    async fn apply(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.credit_author(tx, signed(tx.amount)?).await
    }

    async fn undo(&self, tx: &Transaction, _block: &Block, _sender: &Account) -> Result<(), TransactionError> {
        self.credit_author(tx, -signed(tx.amount)?).await
    }

    async fn apply_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    async fn undo_unconfirmed(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    fn normalize(&self, tx: &mut Transaction) -> Result<(), TransactionError> {
        match &tx.asset {
            Asset::InTransfer { dapp_id } if !dapp_id.is_empty() => Ok(()),
            _ => Err(TransactionError::Normalization(
                "Unable to verify dapp transaction, invalid parameters: dappId is required".to_string(),
            )),
        }
    }

    fn read_from_storage(&self, row: &StorageRow) -> Result<Option<Asset>, TransactionError> {
        Ok(row_str(row, "in_dappId").map(|dapp_id| Asset::InTransfer { dapp_id }))
    }

    async fn save_to_storage(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let record = InTransferRecord {
            transaction_id: tx.id.clone(),
            dapp_id: Self::dapp_id(tx)?.to_string(),
            sender_id: tx.sender_id.clone(),
            sender_public_key: tx.sender_public_key.clone(),
            amount: tx.amount,
            height: tx.block_height.unwrap_or_default(),
        };
        self.ctx.transfers.save_in_transfer(&record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::asset_types::test_support::fixture;
    use crate::domain::dapp::DappRecord;
    use crate::domain::repository::{AccountLedger, DappRepository, TransferRepository};

    fn deposit(dapp_id: &str, amount: u64) -> Transaction {
        let handler_data = CreateData {
            amount,
            recipient_id: Some("ignored".into()),
            asset: Asset::InTransfer {
                dapp_id: dapp_id.to_string(),
            },
        };
        let template = Transaction::template("dep1", TransactionType::InTransfer, &Account::new("42"));
        DepositHandler::new(fixture().ctx)
            .create(handler_data, template)
            .unwrap()
    }

    fn record(id: &str, author: &str) -> DappRecord {
        DappRecord {
            transaction_id: id.to_string(),
            name: format!("app-{}", id),
            description: None,
            tags: None,
            link: Some(format!("https://x.io/{}.zip", id)),
            icon: None,
            category: 1,
            dapp_type: 0,
            author_id: author.to_string(),
            block_id: Some("b1".into()),
            block_height: Some(1),
        }
    }

    #[test]
    fn create_clears_recipient() {
        let tx = deposit("d1", 500);
        assert_eq!(tx.recipient_id, None);
        assert_eq!(tx.amount, 500);
    }

    #[tokio::test]
    async fn verify_requires_known_dapp() {
        let fixture = fixture();
        let handler = DepositHandler::new(fixture.ctx.clone());
        let sender = Account::new("42");

        let err = handler.verify(&deposit("abc", 5), &sender).await.unwrap_err();
        assert_eq!(err.to_string(), "Dapp not found: abc");

        let err = handler.verify(&deposit("abc", 0), &sender).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid transaction amount");

        fixture.dapps.save(&record("abc", "7")).await.unwrap();
        handler.verify(&deposit("abc", 5), &sender).await.unwrap();
    }

    #[tokio::test]
    async fn apply_and_undo_move_author_balance() {
        let fixture = fixture();
        fixture.dapps.save(&record("d1", "7")).await.unwrap();
        let handler = DepositHandler::new(fixture.ctx.clone());
        let tx = deposit("d1", 250);
        let block = Block::new("b2", 2);
        let sender = Account::new("42");

        handler.apply(&tx, &block, &sender).await.unwrap();
        let author = fixture.accounts.get_account("7").await.unwrap().unwrap();
        assert_eq!((author.balance, author.u_balance), (250, 250));

        handler.undo(&tx, &block, &sender).await.unwrap();
        let author = fixture.accounts.get_account("7").await.unwrap().unwrap();
        assert_eq!((author.balance, author.u_balance), (0, 0));
    }

    #[tokio::test]
    async fn apply_for_unknown_dapp_changes_nothing() {
        let fixture = fixture();
        let handler = DepositHandler::new(fixture.ctx.clone());
        let err = handler
            .apply(&deposit("ghost", 10), &Block::new("b", 1), &Account::new("42"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Dapp not found: ghost");
        assert!(fixture.accounts.is_empty());
    }

    #[tokio::test]
    async fn save_records_in_transfer() {
        let fixture = fixture();
        let handler = DepositHandler::new(fixture.ctx.clone());
        let mut tx = deposit("d1", 10);
        tx.block_height = Some(4);
        handler.save_to_storage(&tx).await.unwrap();
        let stored = fixture.transfers.in_transfers("d1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].height, 4);
        assert_eq!(handler.get_bytes(&tx).unwrap(), b"d1".to_vec());
    }

    #[test]
    fn normalize_requires_dapp_id() {
        let handler = DepositHandler::new(fixture().ctx);
        let mut tx = deposit("", 10);
        let err = handler.normalize(&mut tx).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to verify dapp transaction, invalid parameters"));
    }
}
