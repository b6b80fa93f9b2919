//! Derived balance views.
//!
//! These types are computed fresh on every query; only the wallet itself is
//! persisted. The subscription side comes from the external meter and is
//! treated as volatile.

use serde::{Deserialize, Serialize};

/// Combined balance across both credit sources.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CombinedBalance {
    /// Spendable wallet credits. Zero when no wallet exists yet.
    pub wallet: i64,

    /// Remaining subscription allowance, clamped to zero. Reads as zero when
    /// the meter is unavailable.
    pub subscription: i64,

    /// `wallet + subscription`.
    pub total: i64,
}

impl CombinedBalance {
    /// Build a combined balance from its two sources.
    ///
    /// Negative meter readings clamp to zero so a misbehaving meter can never
    /// shrink the spendable wallet balance.
    #[must_use]
    pub fn new(wallet: i64, subscription: i64) -> Self {
        let subscription = subscription.max(0);
        Self {
            wallet,
            subscription,
            total: wallet + subscription,
        }
    }
}

/// Result of an advisory eligibility check. Does not reserve funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCheck {
    /// Whether the combined balance covers the required amount.
    pub has_enough: bool,

    /// The balance the check was computed from.
    pub balance: CombinedBalance,

    /// How the requirement would be satisfied.
    pub source: FundingSource,
}

impl CreditCheck {
    /// Classify how `required` credits would be funded from `balance`.
    #[must_use]
    pub fn evaluate(balance: CombinedBalance, required: i64) -> Self {
        let has_enough = balance.total >= required;
        let source = if !has_enough {
            FundingSource::None
        } else if balance.wallet >= required {
            FundingSource::Wallet
        } else if balance.subscription >= required {
            FundingSource::Subscription
        } else {
            FundingSource::Both
        };

        Self {
            has_enough,
            balance,
            source,
        }
    }
}

/// Which source(s) a deduction would draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingSource {
    /// Wallet alone covers the amount.
    Wallet,

    /// Subscription alone covers the amount.
    Subscription,

    /// Drawing from both sources is required.
    Both,

    /// Combined balance is insufficient.
    None,
}

/// Outcome of a successful deduction: how much each source contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    /// Credits taken from the wallet.
    pub wallet_deducted: i64,

    /// Credits debited from the subscription allowance.
    pub subscription_deducted: i64,
}
