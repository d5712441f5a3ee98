// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # User-Issued Assets
//!
//! Issuers, issued assets, their access-control flags and the balance cache
//! that tracks per-(address, currency) holdings in the confirmed and
//! unconfirmed views.
//!
//! All balance mutations go through [`BalanceCache::update`], which holds a
//! single lock for the closure so a transfer touching two keys commits
//! atomically.

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_ISSUER_DESC_LEN: usize = 4096;
pub const MAX_PRECISION: u8 = 16;
pub const MAX_ACL_BATCH: usize = 10;
pub const MAX_CURRENCY_LEN: usize = 22;

static ISSUER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,16}$").expect("valid issuer pattern"));
static ASSET_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3,6}$").expect("valid asset code pattern"));
static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]*$").expect("valid amount pattern"));

pub fn is_issuer_name(name: &str) -> bool {
    ISSUER_NAME.is_match(name)
}

/// Split `ISSUER.CODE` into its parts when both are well formed.
pub fn split_asset_name(name: &str) -> Option<(&str, &str)> {
    let (issuer, code) = name.split_once('.')?;
    (is_issuer_name(issuer) && ASSET_CODE.is_match(code)).then_some((issuer, code))
}

/// Parse a positive integer amount in the asset's smallest unit.
pub fn parse_amount(amount: &str) -> Option<u128> {
    if !AMOUNT.is_match(amount) {
        return None;
    }
    amount.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    pub name: String,
    pub desc: String,
    pub issuer_id: String,
    #[serde(default)]
    pub transaction_id: String,
}

/// Access-control list selector. The asset's `acl_mode` says which one is
/// enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AclFlag {
    Blacklist,
    Whitelist,
}

impl From<AclFlag> for u8 {
    fn from(value: AclFlag) -> Self {
        match value {
            AclFlag::Blacklist => 0,
            AclFlag::Whitelist => 1,
        }
    }
}

impl TryFrom<u8> for AclFlag {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Blacklist),
            1 => Ok(Self::Whitelist),
            other => Err(format!("Invalid acl flag: {}", other)),
        }
    }
}

/// Flag kinds updated by the asset flags transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagType {
    AclMode,
    Writeoff,
}

impl TryFrom<u8> for FlagType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::AclMode),
            2 => Ok(Self::Writeoff),
            _ => Err("Invalid asset flag type".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedAsset {
    pub name: String,
    pub desc: String,
    pub maximum: u128,
    pub precision: u8,
    pub quantity: u128,
    pub strategy: String,
    pub acl_mode: AclFlag,
    pub writeoff: bool,
    pub allow_writeoff: bool,
    pub allow_whitelist: bool,
    pub allow_blacklist: bool,
    pub issuer_name: String,
    #[serde(default)]
    pub transaction_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceView {
    Confirmed,
    Unconfirmed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Insufficient asset balance")]
pub struct InsufficientBalance;

type BalanceKey = (String, String);

/// Balances guarded by the cache lock.
#[derive(Debug, Default)]
pub struct BalanceBook {
    confirmed: HashMap<BalanceKey, u128>,
    unconfirmed: HashMap<BalanceKey, u128>,
}

impl BalanceBook {
    fn view_mut(&mut self, view: BalanceView) -> &mut HashMap<BalanceKey, u128> {
        match view {
            BalanceView::Confirmed => &mut self.confirmed,
            BalanceView::Unconfirmed => &mut self.unconfirmed,
        }
    }

    fn view(&self, view: BalanceView) -> &HashMap<BalanceKey, u128> {
        match view {
            BalanceView::Confirmed => &self.confirmed,
            BalanceView::Unconfirmed => &self.unconfirmed,
        }
    }

    pub fn balance(&self, view: BalanceView, address: &str, currency: &str) -> u128 {
        self.view(view)
            .get(&(address.to_string(), currency.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn credit(&mut self, view: BalanceView, address: &str, currency: &str, amount: u128) {
        let entry = self
            .view_mut(view)
            .entry((address.to_string(), currency.to_string()))
            .or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Debit `amount`; leaves the book untouched when the balance is short.
    pub fn debit(
        &mut self,
        view: BalanceView,
        address: &str,
        currency: &str,
        amount: u128,
    ) -> Result<(), InsufficientBalance> {
        let current = self.balance(view, address, currency);
        let remaining = current.checked_sub(amount).ok_or(InsufficientBalance)?;
        self.view_mut(view)
            .insert((address.to_string(), currency.to_string()), remaining);
        Ok(())
    }

    /// Move `amount` between two accounts in one view; all or nothing.
    pub fn transfer(
        &mut self,
        view: BalanceView,
        from: &str,
        to: &str,
        currency: &str,
        amount: u128,
    ) -> Result<(), InsufficientBalance> {
        self.debit(view, from, currency, amount)?;
        self.credit(view, to, currency, amount);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BalanceCache {
    book: Mutex<BalanceBook>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, view: BalanceView, address: &str, currency: &str) -> u128 {
        self.book.lock().balance(view, address, currency)
    }

    /// Run `f` with exclusive access to every balance.
    pub fn update<R>(&self, f: impl FnOnce(&mut BalanceBook) -> R) -> R {
        f(&mut self.book.lock())
    }

    /// Non-zero holdings of `address`, sorted by currency.
    pub fn balances_of(&self, view: BalanceView, address: &str) -> Vec<(String, u128)> {
        let book = self.book.lock();
        let mut holdings: Vec<(String, u128)> = book
            .view(view)
            .iter()
            .filter(|((owner, _), amount)| owner == address && **amount > 0)
            .map(|((_, currency), amount)| (currency.clone(), *amount))
            .collect();
        holdings.sort_by(|a, b| a.0.cmp(&b.0));
        holdings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_names_split_into_issuer_and_code() {
        assert_eq!(split_asset_name("ACME.COIN"), Some(("ACME", "COIN")));
        assert_eq!(split_asset_name("acme.coin"), None);
        assert_eq!(split_asset_name("ACME.CO"), None);
        assert_eq!(split_asset_name("ACME"), None);
        assert_eq!(split_asset_name("AC1E.COIN"), None);
    }

    #[test]
    fn amounts_must_be_positive_digit_strings() {
        assert_eq!(parse_amount("1000"), Some(1000));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("01"), None);
        assert_eq!(parse_amount("-5"), None);
        assert_eq!(parse_amount("1.5"), None);
    }

    #[test]
    fn failed_transfer_leaves_book_unchanged() {
        let cache = BalanceCache::new();
        cache.update(|book| book.credit(BalanceView::Confirmed, "a", "ACME.COIN", 10));

        let result = cache.update(|book| book.transfer(BalanceView::Confirmed, "a", "b", "ACME.COIN", 11));
        assert_eq!(result, Err(InsufficientBalance));
        assert_eq!(cache.balance(BalanceView::Confirmed, "a", "ACME.COIN"), 10);
        assert_eq!(cache.balance(BalanceView::Confirmed, "b", "ACME.COIN"), 0);

        cache
            .update(|book| book.transfer(BalanceView::Confirmed, "a", "b", "ACME.COIN", 4))
            .unwrap();
        assert_eq!(cache.balances_of(BalanceView::Confirmed, "b"), vec![("ACME.COIN".to_string(), 4)]);
    }
}
