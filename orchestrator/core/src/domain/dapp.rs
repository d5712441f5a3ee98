// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dapp Aggregate
//!
//! Confirmed application registrations and the value objects derived from
//! them: categories, registry query filters, genesis descriptors handed to the
//! sandbox and deposit/withdrawal transfer records.
//!
//! Field limits shared by `verify` and `normalize` of the registration asset
//! type live here so both paths agree on them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::domain::repository::RepositoryError;
use crate::domain::sandbox::SandboxError;

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_DESCRIPTION_LEN: usize = 160;
pub const MAX_TAGS_LEN: usize = 160;
pub const MAX_VERIFIED_LINK_LEN: usize = 160;
pub const MAX_NORMALIZED_LINK_LEN: usize = 2000;
pub const MAX_DAPP_TYPE: u8 = 1;
pub const MAX_QUERY_LIMIT: usize = 100;

/// Fixed category enumeration, wire value is the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DappCategory {
    Common = 0,
    Business = 1,
    Social = 2,
    Education = 3,
    Entertainment = 4,
    News = 5,
    Life = 6,
    Utilities = 7,
    Games = 8,
}

impl DappCategory {
    pub const ALL: [DappCategory; 9] = [
        Self::Common,
        Self::Business,
        Self::Social,
        Self::Education,
        Self::Entertainment,
        Self::News,
        Self::Life,
        Self::Utilities,
        Self::Games,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Business => "Business",
            Self::Social => "Social",
            Self::Education => "Education",
            Self::Entertainment => "Entertainment",
            Self::News => "News",
            Self::Life => "Life",
            Self::Utilities => "Utilities",
            Self::Games => "Games",
        }
    }

    /// Name-to-code table as exposed by the categories endpoint.
    pub fn table() -> serde_json::Map<String, serde_json::Value> {
        Self::ALL
            .iter()
            .map(|c| (c.name().to_string(), serde_json::Value::from(c.code())))
            .collect()
    }
}

impl FromStr for DappCategory {
    type Err = DappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| DappError::Validation("Invalid dapp category".to_string()))
    }
}

/// A confirmed application registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappRecord {
    pub transaction_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub category: u8,
    #[serde(rename = "type")]
    pub dapp_type: u8,
    /// Account that signed the registration.
    #[serde(default)]
    pub author_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
}

/// Genesis descriptor returned to a sandbox by `dapps#getGenesis`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappGenesis {
    pub point_id: Option<String>,
    pub point_height: Option<u64>,
    pub author_id: String,
    pub dappid: String,
    pub associate: Vec<String>,
}

/// Deposit persisted when an in-transfer is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InTransferRecord {
    pub transaction_id: String,
    pub dapp_id: String,
    pub sender_id: String,
    pub sender_public_key: String,
    pub amount: u64,
    pub height: u64,
}

/// Withdrawal persisted when an out-transfer is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutTransferRecord {
    pub transaction_id: String,
    pub dapp_id: String,
    pub out_transaction_id: String,
    pub recipient_id: String,
    pub amount: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Type,
    Name,
    Category,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Parsed `field:asc|desc` ordering. A bare field sorts descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: SortField,
    pub direction: SortDirection,
}

impl FromStr for OrderBy {
    type Err = DappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let field: String = parts[0]
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let direction = match parts.as_slice() {
            [_, "desc"] => SortDirection::Desc,
            [_, _] => SortDirection::Asc,
            _ => SortDirection::Desc,
        };
        let field = match field.as_str() {
            "type" => SortField::Type,
            "name" => SortField::Name,
            "category" => SortField::Category,
            "link" => SortField::Link,
            _ => return Err(DappError::Validation("Invalid sort field".to_string())),
        };
        Ok(Self { field, direction })
    }
}

/// Registry listing filter. Present fields are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DappQuery {
    pub category: Option<DappCategory>,
    pub name: Option<String>,
    pub dapp_type: Option<u8>,
    pub link: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<OrderBy>,
}

impl DappQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(MAX_QUERY_LIMIT).min(MAX_QUERY_LIMIT)
    }
}

/// Raw listing filter as accepted from callers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappListFilter {
    pub category: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub dapp_type: Option<u8>,
    pub link: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order_by: Option<String>,
}

impl TryFrom<DappListFilter> for DappQuery {
    type Error = DappError;

    fn try_from(filter: DappListFilter) -> Result<Self, Self::Error> {
        if filter.limit.is_some_and(|l| l > MAX_QUERY_LIMIT) {
            return Err(DappError::Validation(format!(
                "Limit must be at most {}",
                MAX_QUERY_LIMIT
            )));
        }
        Ok(Self {
            category: filter.category.as_deref().map(str::parse).transpose()?,
            name: filter.name,
            dapp_type: filter.dapp_type,
            link: filter.link,
            limit: filter.limit,
            offset: filter.offset,
            order_by: filter.order_by.as_deref().map(str::parse).transpose()?,
        })
    }
}

/// `true` when `value` parses as an absolute URI.
pub fn is_uri(value: &str) -> bool {
    Url::parse(value).is_ok()
}

/// `true` when `value` ends in one of `extensions` (given without dots).
pub fn has_extension(value: &str, extensions: &[&str]) -> bool {
    extensions
        .iter()
        .any(|ext| value.ends_with(&format!(".{}", ext)))
}

/// Split a comma separated tag list, returning the first duplicate if any.
pub fn find_duplicate_tag(tags: &str) -> Option<String> {
    let mut sorted: Vec<&str> = tags.split(',').map(str::trim).collect();
    sorted.sort_unstable();
    sorted
        .windows(2)
        .find(|pair| pair[0] == pair[1])
        .map(|pair| pair[0].to_string())
}

/// Errors surfaced by dapp orchestration operations.
#[derive(Debug, Error)]
pub enum DappError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid master password")]
    Unauthorized,

    #[error("{id} Installation failed: {cause}")]
    InstallFailed { id: String, cause: String },

    #[error("{0}")]
    Io(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Several independent teardown steps failed.
    #[error("{}", .0.join("; "))]
    Teardown(Vec<String>),
}

impl fmt::Display for DappCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
