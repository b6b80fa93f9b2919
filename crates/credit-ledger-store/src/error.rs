//! Error types for ledger storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record ("wallet", "transaction").
        entity: &'static str,
        /// The missing key.
        id: String,
    },

    /// The wallet row changed since it was read.
    #[error("wallet version conflict for user {user_id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// The contended user.
        user_id: String,
        /// The version the caller read.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },

    /// A transaction of the same type already carries this reference.
    #[error("reference already used: {reference_id}")]
    DuplicateReference {
        /// The reused external reference.
        reference_id: String,
    },

    /// The delta would drive the wallet balance below zero.
    #[error("negative balance rejected: balance={balance}, delta={delta}")]
    NegativeBalance {
        /// Current balance.
        balance: i64,
        /// Rejected delta.
        delta: i64,
    },
}
