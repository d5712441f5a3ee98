// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Account address validation.
//!
//! Two address forms are accepted: legacy numeric addresses of 1 to 20 digits,
//! and `M<base58check>M` addresses whose payload carries a four byte double
//! SHA-256 checksum.

use sha2::{Digest, Sha256};

const NORMAL_PREFIX: char = 'M';
const CHECKSUM_LEN: usize = 4;

/// Returns `true` when `address` is a well-formed account address.
pub fn is_address(address: &str) -> bool {
    if is_numeric_address(address) {
        return true;
    }
    if address.len() < 3
        || !address.starts_with(NORMAL_PREFIX)
        || !address.ends_with(NORMAL_PREFIX)
    {
        return false;
    }
    decode_base58check(&address[1..address.len() - 1]).is_some()
}

fn is_numeric_address(address: &str) -> bool {
    (1..=20).contains(&address.len()) && address.bytes().all(|b| b.is_ascii_digit())
}

/// Decode a base58check string, returning the payload without its checksum.
pub fn decode_base58check(encoded: &str) -> Option<Vec<u8>> {
    let bytes = bs58::decode(encoded).into_vec().ok()?;
    if bytes.len() < CHECKSUM_LEN {
        return None;
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if checksum != &double_sha256(payload)[..CHECKSUM_LEN] {
        return None;
    }
    Some(payload.to_vec())
}

/// Encode `payload` as base58check.
pub fn encode_base58check(payload: &[u8]) -> String {
    let mut bytes = payload.to_vec();
    bytes.extend_from_slice(&double_sha256(payload)[..CHECKSUM_LEN]);
    bs58::encode(bytes).into_string()
}

fn double_sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(Sha256::digest(data)).to_vec()
}
