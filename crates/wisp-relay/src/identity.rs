//! Wallet identity canonicalization.
//!
//! Every registry key and every routing destination passes through
//! [`canonicalize`] first. Two spellings of the same EVM address (prefixed or
//! not, lowercase, uppercase or EIP-55 checksummed) map to one [`WalletId`];
//! anything else is rejected outright.
//!
//! ```text
//! "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"  ─┐
//! "5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"     ├─> 0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed
//! "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"  ─┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tiny_keccak::{Hasher, Keccak};

use crate::error::IdentityError;

/// Number of hex digits in an EVM address.
pub const ADDRESS_HEX_LEN: usize = 40;

/// Canonical wallet identity: `0x` followed by 40 lowercase hex digits.
///
/// Only constructible through [`canonicalize`], so holding a `WalletId` means
/// the address was well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletId(String);

impl WalletId {
    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the EIP-55 mixed-case form of this address.
    pub fn to_checksummed(&self) -> String {
        let body = &self.0[2..];
        let hash = keccak256(body.as_bytes());
        let mut out = String::with_capacity(2 + ADDRESS_HEX_LEN);
        out.push_str("0x");
        for (i, c) in body.chars().enumerate() {
            if c.is_ascii_alphabetic() && nibble(&hash, i) >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WalletId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        canonicalize(s)
    }
}

impl Serialize for WalletId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        canonicalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Canonicalize a raw wallet address.
///
/// Accepts an optional `0x`/`0X` prefix followed by exactly 40 hex digits.
/// All-lowercase and all-uppercase bodies are accepted as-is; mixed-case
/// bodies must carry a valid EIP-55 checksum.
pub fn canonicalize(raw: &str) -> Result<WalletId, IdentityError> {
    if raw.is_empty() {
        return Err(IdentityError::Empty);
    }

    let body = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    if let Some(bad) = body.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(IdentityError::InvalidCharacter(bad));
    }
    if body.len() != ADDRESS_HEX_LEN {
        return Err(IdentityError::InvalidLength(body.len()));
    }

    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    let lower = body.to_ascii_lowercase();

    if has_lower && has_upper && !checksum_matches(body, &lower) {
        return Err(IdentityError::ChecksumMismatch);
    }

    Ok(WalletId(format!("0x{lower}")))
}

fn checksum_matches(body: &str, lower: &str) -> bool {
    let hash = keccak256(lower.as_bytes());
    body.chars().enumerate().all(|(i, c)| {
        if !c.is_ascii_alphabetic() {
            return true;
        }
        let want_upper = nibble(&hash, i) >= 8;
        c.is_ascii_uppercase() == want_upper
    })
}

/// The i-th hex nibble of a hash, high nibble first.
fn nibble(hash: &[u8; 32], i: usize) -> u8 {
    let byte = hash[i / 2];
    if i % 2 == 0 {
        byte >> 4
    } else {
        byte & 0x0f
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut k = Keccak::v256();
    k.update(data);
    let mut out = [0u8; 32];
    k.finalize(&mut out);
    out
}
