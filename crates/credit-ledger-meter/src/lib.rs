//! Subscription meter client for the credit ledger.
//!
//! Subscription allowances live in an external metering service. This crate
//! defines the [`SubscriptionMeter`] trait the ledger consumes, an HTTP
//! implementation ([`HttpMeter`]), and a no-op fallback ([`NoopMeter`]) for
//! deployments that run wallet-only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;

pub use client::HttpMeter;

use credit_ledger_core::UserId;

/// Error type for subscription meter operations.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// The metering service could not be reached or returned a server error.
    ///
    /// Balance reads treat this as "subscription contributes zero"; debits
    /// treat it as a hard failure and roll back.
    #[error("metering service unavailable: {0}")]
    Unavailable(String),

    /// The metering service rejected the request.
    #[error("metering API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The subscription allowance cannot cover the requested debit.
    #[error("insufficient allowance: remaining {remaining}, required {required}")]
    InsufficientAllowance {
        /// Allowance left on the subscription.
        remaining: i64,
        /// Amount the debit asked for.
        required: i64,
    },
}

/// Read and debit subscription allowances for a user.
///
/// Implementations must not cache balances; the ledger re-checks on every
/// operation because allowances move independently of the wallet.
#[async_trait::async_trait]
pub trait SubscriptionMeter: Send + Sync {
    /// Return the remaining subscription allowance for a user.
    ///
    /// # Errors
    ///
    /// Returns [`MeterError::Unavailable`] when the service cannot be
    /// reached and [`MeterError::Api`] on a rejected request.
    async fn check_balance(&self, user_id: &UserId) -> Result<i64, MeterError>;

    /// Consume `amount` credits from a user's subscription allowance.
    ///
    /// # Errors
    ///
    /// Returns [`MeterError::InsufficientAllowance`] when the allowance
    /// cannot cover the debit, [`MeterError::Unavailable`] when the service
    /// cannot be reached, and [`MeterError::Api`] on a rejected request.
    async fn debit(&self, user_id: &UserId, amount: i64) -> Result<(), MeterError>;
}

/// Meter used when no metering service is configured.
///
/// Every call reports the service as unavailable, which the ledger degrades
/// to a wallet-only view.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMeter;

#[async_trait::async_trait]
impl SubscriptionMeter for NoopMeter {
    async fn check_balance(&self, _user_id: &UserId) -> Result<i64, MeterError> {
        Err(MeterError::Unavailable(
            "subscription metering not configured".to_string(),
        ))
    }

    async fn debit(&self, _user_id: &UserId, _amount: i64) -> Result<(), MeterError> {
        Err(MeterError::Unavailable(
            "subscription metering not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_meter_is_always_unavailable() {
        let meter = NoopMeter;
        let user_id = UserId::generate();

        assert!(matches!(
            meter.check_balance(&user_id).await,
            Err(MeterError::Unavailable(_))
        ));
        assert!(matches!(
            meter.debit(&user_id, 10).await,
            Err(MeterError::Unavailable(_))
        ));
    }
}
