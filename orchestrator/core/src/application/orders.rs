// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deposit and withdrawal orders.
//!
//! Both arrive as loosely typed JSON (HTTP body or sandbox call args). They
//! are checked here and turned into a [`TransferOrder`]; key derivation and
//! signing belong to the [`TransactionSubmitter`](crate::domain::repository::TransactionSubmitter).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::address::is_address;
use crate::domain::repository::TransferOrder;
use crate::domain::transaction::{Asset, TransactionType, TOTAL_AMOUNT};

const MAX_SECRET_LEN: usize = 100;
const MAX_RECIPIENT_LEN: usize = 50;
const MAX_REFERENCE_LEN: usize = 64;

/// Deserialize call arguments, reporting the first problem the way every
/// other parameter check does.
pub fn parse_params<T: DeserializeOwned>(value: Value) -> Result<T, String> {
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| format!("Invalid parameters: {}", e))
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        return Err(format!(
            "Invalid parameters: {} is too short ({} chars), minimum {}",
            field, len, min
        ));
    }
    if len > max {
        return Err(format!(
            "Invalid parameters: {} is too long ({} chars), maximum {}",
            field, len, max
        ));
    }
    Ok(())
}

fn check_amount(amount: u64) -> Result<(), String> {
    if !(1..=TOTAL_AMOUNT).contains(&amount) {
        return Err(format!(
            "Invalid parameters: amount {} is outside 1..={}",
            amount, TOTAL_AMOUNT
        ));
    }
    Ok(())
}

/// 32 byte key in hex.
pub fn is_public_key(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn check_public_key(field: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(key) if !is_public_key(key) => Err(format!(
            "Invalid parameters: {} must be a hex encoded public key",
            field
        )),
        _ => Ok(()),
    }
}

/// Deposit into a dapp.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub secret: String,
    pub amount: u64,
    pub dapp_id: String,
    pub public_key: Option<String>,
    pub second_secret: Option<String>,
    pub multisig_account_public_key: Option<String>,
}

impl DepositRequest {
    pub fn into_order(self) -> Result<TransferOrder, String> {
        check_len("secret", &self.secret, 1, MAX_SECRET_LEN)?;
        check_amount(self.amount)?;
        check_len("dappId", &self.dapp_id, 1, usize::MAX)?;
        if let Some(second) = &self.second_secret {
            check_len("secondSecret", second, 1, MAX_SECRET_LEN)?;
        }
        check_public_key("publicKey", self.public_key.as_deref())?;
        check_public_key(
            "multisigAccountPublicKey",
            self.multisig_account_public_key.as_deref(),
        )?;

        Ok(TransferOrder {
            tx_type: TransactionType::InTransfer,
            secret: self.secret,
            second_secret: self.second_secret,
            public_key: self.public_key,
            multisig_account_public_key: self.multisig_account_public_key,
            amount: self.amount,
            recipient_id: None,
            asset: Asset::InTransfer {
                dapp_id: self.dapp_id,
            },
        })
    }
}

/// Withdrawal out of the calling dapp, `transaction_id` being the dapp-side
/// reference.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub secret: String,
    pub amount: u64,
    pub recipient_id: String,
    pub transaction_id: String,
    pub second_secret: Option<String>,
    pub multisig_account_public_key: Option<String>,
}

impl WithdrawalRequest {
    pub fn into_order(self, dapp_id: &str) -> Result<TransferOrder, String> {
        check_len("secret", &self.secret, 1, MAX_SECRET_LEN)?;
        check_amount(self.amount)?;
        check_len("recipientId", &self.recipient_id, 1, MAX_RECIPIENT_LEN)?;
        check_len("transactionId", &self.transaction_id, 1, MAX_REFERENCE_LEN)?;
        if let Some(second) = &self.second_secret {
            check_len("secondSecret", second, 1, MAX_SECRET_LEN)?;
        }
        check_public_key(
            "multisigAccountPublicKey",
            self.multisig_account_public_key.as_deref(),
        )?;
        if !is_address(&self.recipient_id) {
            return Err("Invalid address".to_string());
        }

        Ok(TransferOrder {
            tx_type: TransactionType::OutTransfer,
            secret: self.secret,
            second_secret: self.second_secret,
            public_key: None,
            multisig_account_public_key: self.multisig_account_public_key,
            amount: self.amount,
            recipient_id: Some(self.recipient_id),
            asset: Asset::OutTransfer {
                dapp_id: dapp_id.to_string(),
                transaction_id: self.transaction_id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deposit_becomes_in_transfer_order() {
        let request: DepositRequest =
            parse_params(json!({"secret": "s", "amount": 5, "dappId": "d1"})).unwrap();
        let order = request.into_order().unwrap();
        assert_eq!(order.tx_type, TransactionType::InTransfer);
        assert_eq!(order.asset, Asset::InTransfer { dapp_id: "d1".into() });
        assert_eq!(order.recipient_id, None);
    }

    #[test]
    fn deposit_rejects_missing_fields_and_zero_amount() {
        let err = parse_params::<DepositRequest>(json!({"amount": 5})).unwrap_err();
        assert!(err.starts_with("Invalid parameters: missing field `secret`"));

        let request: DepositRequest =
            parse_params(json!({"secret": "s", "amount": 0, "dappId": "d1"})).unwrap();
        assert!(request.into_order().unwrap_err().contains("amount 0"));
    }

    #[test]
    fn withdrawal_checks_recipient_address() {
        let body = json!({
            "secret": "s",
            "amount": 10,
            "recipientId": "not-an-address",
            "transactionId": "ref-1"
        });
        let request: WithdrawalRequest = parse_params(body).unwrap();
        assert_eq!(request.into_order("d1").unwrap_err(), "Invalid address");

        let body = json!({
            "secret": "s",
            "amount": 10,
            "recipientId": "12345",
            "transactionId": "ref-1"
        });
        let order = parse_params::<WithdrawalRequest>(body)
            .unwrap()
            .into_order("d1")
            .unwrap();
        assert_eq!(order.recipient_id.as_deref(), Some("12345"));
        assert_eq!(
            order.asset,
            Asset::OutTransfer {
                dapp_id: "d1".into(),
                transaction_id: "ref-1".into()
            }
        );
    }

    #[test]
    fn withdrawal_reference_is_bounded() {
        let body = json!({
            "secret": "s",
            "amount": 10,
            "recipientId": "12345",
            "transactionId": "x".repeat(65)
        });
        let err = parse_params::<WithdrawalRequest>(body)
            .unwrap()
            .into_order("d1")
            .unwrap_err();
        assert!(err.contains("transactionId is too long"));
    }

    #[test]
    fn public_keys_are_hex() {
        assert!(is_public_key(&"ab".repeat(32)));
        assert!(!is_public_key("abc"));
        assert!(!is_public_key(&"zz".repeat(32)));
    }
}
