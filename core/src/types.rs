//! Core types for STATEDUMP
//!
//! Defines the account records, hashes, and snapshot metadata shared across
//! the export engine.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Length of an account address in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Length of a hash in bytes
pub const HASH_LENGTH: usize = 32;

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// 20-byte account address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Address(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; ADDRESS_LENGTH] = bytes.try_into().ok()?;
        Some(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Canonical textual form, `0x` followed by lowercase hex
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Parse from hex, with or without the `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed(s).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_prefixed_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_prefixed_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_prefixed_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Address)
        }
    }
}

/// 32-byte hash type
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; HASH_LENGTH]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `0x` followed by 64 lowercase hex chars, the form external verifiers expect
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Parse from hex, with or without the `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_fixed(s).map(Hash)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", self.to_hex())
    }
}

/// State root hash
pub type StateRoot = Hash;

/// A single denomination balance.
///
/// Amounts are signed like the ledger's own representation; negative values
/// are rejected when the account is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: i64,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: i64) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

/// One account as captured at the snapshot height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub address: Address,
    pub account_number: u64,
    #[serde(default)]
    pub coins: Vec<Coin>,
}

impl AccountRecord {
    pub fn new(address: Address, account_number: u64, coins: Vec<Coin>) -> Self {
        Self {
            address,
            account_number,
            coins,
        }
    }

    /// Amount held for `denom`, summed over duplicate entries
    pub fn amount_of(&self, denom: &str) -> i128 {
        self.coins
            .iter()
            .filter(|c| c.denom == denom)
            .map(|c| c.amount as i128)
            .sum()
    }
}

/// Chain metadata recorded alongside the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SnapshotMetadata {
    pub chain_id: String,
    pub block_height: u64,
    /// Opaque commit identifier of the state at `block_height`
    pub commit_id: String,
}

impl SnapshotMetadata {
    pub fn new(chain_id: impl Into<String>, block_height: u64, commit_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            block_height,
            commit_id: commit_id.into(),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running export
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex() {
        let addr = Address([0xab; ADDRESS_LENGTH]);
        let hex = addr.to_prefixed_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 2 + 2 * ADDRESS_LENGTH);
        assert_eq!(Address::from_hex(&hex).unwrap(), addr);
        assert_eq!(Address::from_hex(&addr.to_hex()).unwrap(), addr);
    }

    #[test]
    fn test_address_wrong_length() {
        assert!(Address::from_hex("0xabcd").is_err());
        assert!(Address::from_slice(&[1u8; 32]).is_none());
    }

    #[test]
    fn test_address_json_is_prefixed_hex() {
        let addr = Address([1u8; ADDRESS_LENGTH]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_prefixed_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_hash_prefixed_hex() {
        let hash = Hash([0x0f; HASH_LENGTH]);
        let text = hash.to_prefixed_hex();
        assert_eq!(text.len(), 66);
        assert_eq!(&text[..4], "0x0f");
        assert_eq!(Hash::from_hex(&text).unwrap(), hash);
    }

    #[test]
    fn test_amount_of() {
        let account = AccountRecord::new(
            Address::ZERO,
            0,
            vec![Coin::new("ATOM", 10), Coin::new("BNB", 3)],
        );
        assert_eq!(account.amount_of("ATOM"), 10);
        assert_eq!(account.amount_of("XYZ"), 0);
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
