// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transaction Envelope
//!
//! Immutable transaction envelope consumed by the asset type handlers. The
//! `asset` payload is a tagged variant keyed by [`TransactionType`]; a handler
//! only ever looks at the variant it owns.
//!
//! Transactions are never mutated after signing, with the single exception of
//! multisignature entries appended to `signatures`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest currency unit: one whole coin is `FIXED_POINT` units.
pub const FIXED_POINT: u64 = 100_000_000;

/// Upper bound for any single transfer amount.
pub const TOTAL_AMOUNT: u64 = 10_000_000_000_000_000;

/// Wire-stable transaction type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TransactionType {
    Send,
    Signature,
    Delegate,
    Vote,
    Multi,
    Dapp,
    InTransfer,
    OutTransfer,
    Storage,
    UiaIssuer,
    UiaAsset,
    UiaFlags,
    UiaAcl,
    UiaIssue,
    UiaTransfer,
}

impl TransactionType {
    pub fn code(self) -> u8 {
        match self {
            Self::Send => 0,
            Self::Signature => 1,
            Self::Delegate => 2,
            Self::Vote => 3,
            Self::Multi => 4,
            Self::Dapp => 5,
            Self::InTransfer => 6,
            Self::OutTransfer => 7,
            Self::Storage => 8,
            Self::UiaIssuer => 9,
            Self::UiaAsset => 10,
            Self::UiaFlags => 11,
            Self::UiaAcl => 12,
            Self::UiaIssue => 13,
            Self::UiaTransfer => 14,
        }
    }
}

impl From<TransactionType> for u8 {
    fn from(value: TransactionType) -> Self {
        value.code()
    }
}

impl TryFrom<u8> for TransactionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Send,
            1 => Self::Signature,
            2 => Self::Delegate,
            3 => Self::Vote,
            4 => Self::Multi,
            5 => Self::Dapp,
            6 => Self::InTransfer,
            7 => Self::OutTransfer,
            8 => Self::Storage,
            9 => Self::UiaIssuer,
            10 => Self::UiaAsset,
            11 => Self::UiaFlags,
            12 => Self::UiaAcl,
            13 => Self::UiaIssue,
            14 => Self::UiaTransfer,
            other => return Err(format!("Unknown transaction type: {}", other)),
        })
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Application registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DappAsset {
    pub category: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(rename = "type")]
    pub dapp_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Issued-asset registration payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UiaAssetPayload {
    pub name: String,
    pub desc: String,
    /// Decimal string, parsed as `u128`.
    pub maximum: String,
    pub precision: u8,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub allow_writeoff: bool,
    #[serde(default)]
    pub allow_whitelist: bool,
    #[serde(default)]
    pub allow_blacklist: bool,
}

/// Tagged asset payload, one variant per transaction type that carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Asset {
    #[default]
    None,
    Dapp(DappAsset),
    #[serde(rename_all = "camelCase")]
    InTransfer { dapp_id: String },
    #[serde(rename_all = "camelCase")]
    OutTransfer { dapp_id: String, transaction_id: String },
    UiaIssuer { name: String, desc: String },
    UiaAsset(UiaAssetPayload),
    #[serde(rename_all = "camelCase")]
    UiaFlags { currency: String, flag_type: u8, flag: u8 },
    UiaAcl {
        currency: String,
        operator: String,
        flag: u8,
        list: Vec<String>,
    },
    UiaIssue { currency: String, amount: String },
    UiaTransfer { currency: String, amount: String },
}

/// Signed transaction envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default)]
    pub timestamp: i64,
    pub sender_id: String,
    #[serde(default)]
    pub sender_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub amount: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub asset: Asset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
    /// Set once the transaction is included in a confirmed block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

impl Transaction {
    /// Unsigned template for `tx_type`, to be filled by a handler's `create`.
    pub fn template(
        id: impl Into<String>,
        tx_type: TransactionType,
        sender: &Account,
    ) -> Self {
        Self {
            id: id.into(),
            tx_type,
            timestamp: 0,
            sender_id: sender.address.clone(),
            sender_public_key: sender.public_key.clone().unwrap_or_default(),
            requester_public_key: None,
            recipient_id: None,
            amount: 0,
            fee: 0,
            asset: Asset::None,
            signature: None,
            sign_signature: None,
            signatures: None,
            block_id: None,
            block_height: None,
        }
    }

    /// Attach an additional multisignature entry.
    pub fn add_signature(&mut self, signature: impl Into<String>) {
        self.signatures
            .get_or_insert_with(Vec::new)
            .push(signature.into());
    }
}

/// Type-specific inputs handed to `create`.
#[derive(Debug, Clone, Default)]
pub struct CreateData {
    pub amount: u64,
    pub recipient_id: Option<String>,
    pub asset: Asset,
}

/// Sender account as seen by the handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub u_balance: i64,
    #[serde(default)]
    pub multisignatures: Vec<String>,
    #[serde(default)]
    pub multimin: u32,
    #[serde(default)]
    pub second_signature: bool,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

/// The subset of block structure the asset types need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub height: u64,
}

impl Block {
    pub fn new(id: impl Into<String>, height: u64) -> Self {
        Self { id: id.into(), height }
    }
}
