//! `RocksDB` storage layer for the credit ledger.
//!
//! This crate persists wallets and the append-only transaction log using
//! `RocksDB` with column families for indexing.
//!
//! # Architecture
//!
//! - `wallets`: per-user wallet records, keyed by `user_id`
//! - `transactions`: transaction records, keyed by `transaction_id` (ULID)
//! - `transactions_by_user`: index for newest-first history listings
//! - `transactions_by_reference`: index for idempotency lookups by
//!   external reference
//!
//! Wallet writes are conditional on the version observed at read time;
//! a stale version fails with [`StoreError::VersionConflict`] so a lost
//! update can never happen silently.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger_store::{RocksStore, WalletStore};
//! use credit_ledger_core::UserId;
//!
//! let store = RocksStore::open("/tmp/credit-ledger-db").unwrap();
//! let wallet = store.get_or_create_wallet(&UserId::generate()).unwrap();
//! assert_eq!(wallet.balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use credit_ledger_core::{Transaction, TransactionId, UserId, Wallet};

/// An atomic adjustment to a wallet row.
///
/// The balance delta and counter increments apply together or not at all.
/// `expires_at` overwrites the wallet's bonus expiry when set.
#[derive(Debug, Clone, Default)]
pub struct WalletDelta {
    /// Signed change to the spendable balance.
    pub balance: i64,

    /// Increment to the lifetime purchased counter.
    pub purchased: i64,

    /// Increment to the lifetime bonus counter.
    pub bonus: i64,

    /// New bonus expiry (last-write-wins), if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl WalletDelta {
    /// A delta that only adjusts the spendable balance.
    #[must_use]
    pub fn balance(amount: i64) -> Self {
        Self {
            balance: amount,
            ..Self::default()
        }
    }
}

/// The storage trait defining all wallet and transaction-log operations.
///
/// Abstracting the storage layer keeps the ledger service testable against
/// alternative backends.
pub trait WalletStore: Send + Sync {
    // =========================================================================
    // Wallet Operations
    // =========================================================================

    /// Get a wallet by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_wallet(&self, user_id: &UserId) -> Result<Option<Wallet>>;

    /// Get a wallet, creating an empty one if absent.
    ///
    /// Safe to call concurrently for the same user; the unique wallet key
    /// guarantees at most one record per user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_or_create_wallet(&self, user_id: &UserId) -> Result<Wallet>;

    /// Conditionally apply a delta to a wallet, optionally appending a
    /// transaction in the same atomic unit.
    ///
    /// The update only succeeds when the stored version still equals
    /// `expected_version`; callers re-read and retry on conflict.
    /// Returns the updated wallet.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the wallet doesn't exist.
    /// - [`StoreError::VersionConflict`] if a concurrent writer got there
    ///   first.
    /// - [`StoreError::NegativeBalance`] if the delta would drive the
    ///   balance below zero.
    fn apply_wallet_delta(
        &self,
        user_id: &UserId,
        expected_version: u64,
        delta: &WalletDelta,
        transaction: Option<&Transaction>,
    ) -> Result<Wallet>;

    /// Apply a grant delta, appending its transaction in the same atomic
    /// unit.
    ///
    /// Behaves like [`apply_wallet_delta`](WalletStore::apply_wallet_delta),
    /// except that the transaction's external reference (when present) is
    /// checked for reuse inside the critical section that orders wallet
    /// writes. Two racing deliveries of the same grant serialize there;
    /// exactly one commits and the other fails with
    /// [`StoreError::DuplicateReference`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateReference`] if a transaction of the same
    ///   type already carries the reference.
    /// - [`StoreError::NotFound`] if the wallet doesn't exist.
    /// - [`StoreError::VersionConflict`] if a concurrent writer got there
    ///   first.
    fn apply_grant(
        &self,
        user_id: &UserId,
        expected_version: u64,
        delta: &WalletDelta,
        transaction: &Transaction,
    ) -> Result<Wallet>;

    // =========================================================================
    // Transaction Log Operations
    // =========================================================================

    /// Append a transaction. Pure insert; records are never updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// List a user's transactions, newest first, restartable via offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    /// Find a user's transactions carrying exactly the given external
    /// reference.
    ///
    /// Used to resolve idempotent grants: a replayed payment confirmation
    /// is recognized by its reference and applied at most once.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transactions_by_reference(
        &self,
        user_id: &UserId,
        reference_id: &str,
    ) -> Result<Vec<Transaction>>;
}

impl From<StoreError> for credit_ledger_core::LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                if entity == "wallet" {
                    Self::WalletNotFound { user_id: id }
                } else {
                    Self::Storage(format!("{entity} not found: {id}"))
                }
            }
            StoreError::VersionConflict { user_id, .. } => Self::Concurrency { user_id },
            StoreError::DuplicateReference { reference_id } => {
                Self::DuplicateReference { reference_id }
            }
            StoreError::NegativeBalance { balance, delta } => Self::Storage(format!(
                "balance invariant violated: balance={balance}, delta={delta}"
            )),
            StoreError::Database(msg) => Self::Storage(msg),
            StoreError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}
