//! Error types for ledger operations.

use crate::ids::IdError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// `InvalidAmount` and `InsufficientCredits` are terminal caller-facing
/// outcomes and are never retried internally. `Concurrency` and
/// `ExternalService` surface only after the ledger's internal retry or
/// compensation pass has run.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Non-positive amount or otherwise invalid caller input.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Combined balance is short. An expected business outcome, not a
    /// system error.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Available combined balance at the time of the check.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// No wallet exists for the user (refunds require prior history).
    #[error("wallet not found: {user_id}")]
    WalletNotFound {
        /// The user whose wallet was not found.
        user_id: String,
    },

    /// A grant reference was already recorded with a different type or
    /// amount, so replaying it would not be a safe no-op.
    #[error("duplicate reference: {reference_id}")]
    DuplicateReference {
        /// The conflicting reference ID.
        reference_id: String,
    },

    /// A concurrent writer kept invalidating the wallet read; the bounded
    /// retry budget was exhausted. Transient, safe for the caller to retry.
    #[error("concurrent update conflict for user {user_id}")]
    Concurrency {
        /// The contended user.
        user_id: String,
    },

    /// The subscription meter failed during a debit.
    #[error("external service error: {service} - {message}")]
    ExternalService {
        /// The service that failed.
        service: String,
        /// Error message.
        message: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
