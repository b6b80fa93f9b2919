//! Transaction types for the credit ledger.
//!
//! Every balance-affecting event appends one transaction. Records are
//! immutable once written; the sum of a user's transaction amounts is the
//! expected historical total used for audit and reconciliation, independent
//! of the wallet's live balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, UserId};

/// An append-only record of a single balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Signed amount. Positive = credit added, negative = credit consumed.
    pub amount: i64,

    /// Human-readable description.
    pub description: String,

    /// Correlation key to an external event (payment ID, billable action).
    /// Grants with a reference are idempotent: redelivery of the same
    /// reference with matching type and amount is a no-op.
    pub reference_id: Option<String>,

    /// Open attribute bag (payment session, deduction source, etc.).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a purchase transaction (positive amount).
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        amount: i64,
        description: String,
        reference_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::record(
            user_id,
            TransactionType::Purchase,
            amount.abs(),
            description,
            reference_id,
            metadata,
        )
    }

    /// Create a bonus transaction (positive amount).
    #[must_use]
    pub fn bonus(
        user_id: UserId,
        amount: i64,
        description: String,
        reference_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::record(
            user_id,
            TransactionType::Bonus,
            amount.abs(),
            description,
            reference_id,
            metadata,
        )
    }

    /// Create a usage transaction. The stored amount is always negative.
    #[must_use]
    pub fn usage(
        user_id: UserId,
        amount: i64,
        description: String,
        reference_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::record(
            user_id,
            TransactionType::Usage,
            -amount.abs(),
            description,
            reference_id,
            metadata,
        )
    }

    /// Create a refund transaction (positive amount).
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount: i64,
        description: String,
        reference_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self::record(
            user_id,
            TransactionType::Refund,
            amount.abs(),
            description,
            reference_id,
            metadata,
        )
    }

    /// Create an expiration transaction (negative amount).
    ///
    /// Written by reconciliation tooling when an expired bonus batch is
    /// swept; the ledger service itself does not expire credits.
    #[must_use]
    pub fn expiration(user_id: UserId, amount: i64, description: String) -> Self {
        Self::record(
            user_id,
            TransactionType::Expiration,
            -amount.abs(),
            description,
            None,
            serde_json::Value::Null,
        )
    }

    fn record(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: i64,
        description: String,
        reference_id: Option<String>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            transaction_type,
            amount,
            description,
            reference_id,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Type of credit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// User purchased credits.
    Purchase,

    /// Credits consumed by a billable action.
    Usage,

    /// Promotional/bonus credits.
    Bonus,

    /// Refund issued.
    Refund,

    /// Expired bonus credits swept.
    Expiration,
}

impl TransactionType {
    /// Whether this transaction type adds credits.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Purchase | Self::Bonus | Self::Refund)
    }

    /// Whether this transaction type removes credits.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Usage | Self::Expiration)
    }
}

/// The kind of a credit grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// Credits added via purchase.
    Purchase,

    /// Credits added as bonus.
    Bonus,
}

impl GrantKind {
    /// The transaction type recorded for this grant kind.
    #[must_use]
    pub const fn transaction_type(self) -> TransactionType {
        match self {
            Self::Purchase => TransactionType::Purchase,
            Self::Bonus => TransactionType::Bonus,
        }
    }
}
