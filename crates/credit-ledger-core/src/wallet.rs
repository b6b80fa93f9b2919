//! Wallet types for the credit ledger.
//!
//! A wallet is the persistent per-user credit record. It is distinct from the
//! externally metered subscription allowance, which is read fresh on every
//! balance query and never stored here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A per-user credit wallet.
///
/// `balance` is the number of credits currently spendable and is never
/// allowed to go negative. `purchased_credits` and `bonus_credits` are
/// lifetime-earned counters: they only ever grow when credits are granted and
/// are not decremented by usage, so they do not reconcile with `balance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// The owning user.
    pub user_id: UserId,

    /// Current spendable credits. Invariant: `balance >= 0`.
    pub balance: i64,

    /// Lifetime credits added via purchase.
    pub purchased_credits: i64,

    /// Lifetime credits added as bonus.
    pub bonus_credits: i64,

    /// Expiry of the most recently granted bonus batch, if any.
    /// A later bonus grant with an expiry overwrites this (last-write-wins).
    pub expires_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency token, bumped on every mutation.
    pub version: u64,

    /// When the wallet was created.
    pub created_at: DateTime<Utc>,

    /// When the wallet was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new wallet with all balances at zero.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: 0,
            purchased_credits: 0,
            bonus_credits: 0,
            expires_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the wallet alone covers a deduction.
    #[must_use]
    pub fn covers(&self, amount: i64) -> bool {
        self.balance >= amount
    }
}
