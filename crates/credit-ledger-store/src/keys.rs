//! Key encoding for the `RocksDB` column families.

use credit_ledger_core::{TransactionId, UserId};

/// Create a wallet key from a user ID.
#[must_use]
pub fn wallet_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`.
///
/// ULIDs are time-ordered, so a forward scan of a user's prefix yields
/// transactions in chronological order.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for a user.
#[must_use]
pub fn user_transactions_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a reference index key.
///
/// Format: `user_id (16 bytes) || reference_id bytes || 0x00 ||
/// transaction_id (16 bytes)`. The 0x00 delimiter terminates the
/// variable-length reference, so a prefix scan for `cs_1` cannot pick up
/// entries stored under `cs_12`. Several transactions can legitimately
/// share a reference (a deduction writes one entry per funded source), so
/// the transaction ID suffix keeps keys unique.
#[must_use]
pub fn reference_key(
    user_id: &UserId,
    reference_id: &str,
    transaction_id: &TransactionId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(33 + reference_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(reference_id.as_bytes());
    key.push(0);
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions sharing a reference.
///
/// Includes the trailing 0x00 delimiter so only exact reference matches
/// fall under the prefix.
#[must_use]
pub fn reference_prefix(user_id: &UserId, reference_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(17 + reference_id.len());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(reference_id.as_bytes());
    key.push(0);
    key
}

/// Extract the transaction ID from the trailing 16 bytes of an index key.
///
/// # Panics
///
/// Panics if the key is shorter than 16 bytes.
#[must_use]
pub fn extract_transaction_id(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    TransactionId::from_bytes(bytes)
}
