// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Unconfirmed Reservation Index
//!
//! Claims on globally unique keys (dapp names and links, issuer names and
//! addresses, asset names) held by transactions sitting in the unconfirmed
//! pool, plus the state of withdrawal references.
//!
//! Every operation is atomic per key through the `DashMap` entry API: two
//! concurrent `reserve` calls on the same key yield exactly one success.
//!
//! ## Withdrawal references
//!
//! A reference is held by one out-transfer at a time. Only the holder can
//! move or release it.
//!
//! | Transition | Resulting mark |
//! |------------|----------------|
//! | `apply_unconfirmed` | `InFlight` (claim, fails when held by another) |
//! | `undo_unconfirmed` | released |
//! | `apply` | `Settled` |
//! | `undo` | `InFlight` |

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

/// Namespace of a reserved key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpace {
    DappName,
    DappLink,
    IssuerName,
    IssuerAddress,
    AssetName,
}

/// State of a withdrawal reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalMark {
    /// Held by an unconfirmed (or unwound) out-transfer.
    InFlight,
    /// The out-transfer is part of a confirmed block.
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WithdrawalHold {
    mark: WithdrawalMark,
    holder: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Key already reserved: {key}")]
pub struct ReservationConflict {
    pub space: KeySpace,
    pub key: String,
}

#[derive(Debug, Default)]
pub struct ReservationIndex {
    keys: DashMap<(KeySpace, String), ()>,
    withdrawals: DashMap<String, WithdrawalHold>,
}

impl ReservationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` in `space`; fails if it is already held.
    pub fn reserve(&self, space: KeySpace, key: &str) -> Result<(), ReservationConflict> {
        match self.keys.entry((space, key.to_string())) {
            Entry::Occupied(_) => Err(ReservationConflict {
                space,
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(())
            }
        }
    }

    /// Claim every key or none of them.
    pub fn reserve_all(&self, claims: &[(KeySpace, &str)]) -> Result<(), ReservationConflict> {
        for (taken, (space, key)) in claims.iter().enumerate() {
            if let Err(conflict) = self.reserve(*space, key) {
                for (space, key) in &claims[..taken] {
                    self.release(*space, key);
                }
                return Err(conflict);
            }
        }
        Ok(())
    }

    pub fn release(&self, space: KeySpace, key: &str) {
        self.keys.remove(&(space, key.to_string()));
    }

    pub fn is_reserved(&self, space: KeySpace, key: &str) -> bool {
        self.keys.contains_key(&(space, key.to_string()))
    }

    /// Claim `reference` for out-transfer `holder`. A holder re-claiming its
    /// own in-flight reference succeeds; otherwise the current mark is
    /// returned.
    pub fn claim_withdrawal(&self, reference: &str, holder: &str) -> Result<(), WithdrawalMark> {
        match self.withdrawals.entry(reference.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(WithdrawalHold {
                    mark: WithdrawalMark::InFlight,
                    holder: holder.to_string(),
                });
                Ok(())
            }
            Entry::Occupied(slot) => {
                let hold = slot.get();
                if hold.mark == WithdrawalMark::InFlight && hold.holder == holder {
                    Ok(())
                } else {
                    Err(hold.mark)
                }
            }
        }
    }

    pub fn mark_settled(&self, reference: &str, holder: &str) {
        self.set_mark(reference, holder, WithdrawalMark::Settled);
    }

    /// Return a settled reference to in flight after its block is undone.
    pub fn mark_unsettled(&self, reference: &str, holder: &str) {
        self.set_mark(reference, holder, WithdrawalMark::InFlight);
    }

    fn set_mark(&self, reference: &str, holder: &str, mark: WithdrawalMark) {
        self.withdrawals.insert(
            reference.to_string(),
            WithdrawalHold {
                mark,
                holder: holder.to_string(),
            },
        );
    }

    /// Release `reference` if `holder` holds it. Returns whether it did.
    pub fn release_withdrawal(&self, reference: &str, holder: &str) -> bool {
        self.withdrawals
            .remove_if(reference, |_, hold| hold.holder == holder)
            .is_some()
    }

    pub fn withdrawal_state(&self, reference: &str) -> Option<WithdrawalMark> {
        self.withdrawals.get(reference).map(|hold| hold.mark)
    }
}
