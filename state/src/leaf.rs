//! Canonical leaf encoding for account records
//!
//! Two records with the same logical content always encode to the same bytes:
//! coins are validated and sorted by denom before serialization, so the order
//! a store keeps them in never leaks into the commitment.

use statedump_core::{AccountRecord, Coin, DumpError, DumpResult, Hash, ADDRESS_LENGTH};
use statedump_crypto::MerkleHasher;

/// An account with canonical coin order together with its leaf bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLeaf {
    pub account: AccountRecord,
    pub bytes: Vec<u8>,
}

/// Validate and sort an account's coins.
///
/// Fails on an empty denom, a negative amount, or a denom listed twice.
pub fn canonicalize(account: &AccountRecord) -> DumpResult<AccountRecord> {
    let mut coins = account.coins.clone();
    coins.sort_by(|a, b| a.denom.as_bytes().cmp(b.denom.as_bytes()));

    for coin in &coins {
        if coin.denom.is_empty() {
            return Err(DumpError::Encoding(format!(
                "account {} has a coin with an empty denom",
                account.address
            )));
        }
        if coin.amount < 0 {
            return Err(DumpError::Encoding(format!(
                "account {} has negative amount {} for {}",
                account.address, coin.amount, coin.denom
            )));
        }
    }

    if let Some(pair) = coins.windows(2).find(|w| w[0].denom == w[1].denom) {
        return Err(DumpError::Encoding(format!(
            "account {} lists denom {} more than once",
            account.address, pair[0].denom
        )));
    }

    Ok(AccountRecord {
        address: account.address,
        account_number: account.account_number,
        coins,
    })
}

/// Canonicalize and encode one account
pub fn encode_leaf(account: &AccountRecord) -> DumpResult<EncodedLeaf> {
    let account = canonicalize(account)?;

    let coins: Vec<(&str, u64)> = account
        .coins
        .iter()
        .map(|Coin { denom, amount }| (denom.as_str(), *amount as u64))
        .collect();

    // bincode 1.x defaults: fixed-width little-endian integers, u64 length prefixes
    let address: &[u8; ADDRESS_LENGTH] = account.address.as_bytes();
    let bytes = bincode::serialize(&(address, account.account_number, coins))?;

    Ok(EncodedLeaf { account, bytes })
}

/// Canonical byte encoding of one account
pub fn encode_account(account: &AccountRecord) -> DumpResult<Vec<u8>> {
    encode_leaf(account).map(|leaf| leaf.bytes)
}

/// Leaf hash of one account
pub fn leaf_hash<H: MerkleHasher>(hasher: &H, account: &AccountRecord) -> DumpResult<Hash> {
    Ok(hasher.hash(&encode_account(account)?))
}
