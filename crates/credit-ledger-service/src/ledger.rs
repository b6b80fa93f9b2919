//! Credit ledger operations.
//!
//! The ledger coordinates the two balance sources: the persistent wallet in
//! the store and the subscription allowance behind the metering service.
//! Deductions drain the wallet first, then fall through to the subscription.
//!
//! Wallet writes are optimistic. Every mutation re-reads the wallet, applies
//! a version-checked delta, and retries on conflict up to
//! [`MAX_VERSION_RETRIES`] times before giving up with a concurrency error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use credit_ledger_core::{
    CombinedBalance, CreditCheck, Deduction, GrantKind, LedgerError, Result, Transaction, UserId,
    Wallet,
};
use credit_ledger_meter::{MeterError, SubscriptionMeter};
use credit_ledger_store::{StoreError, WalletDelta, WalletStore};

/// How many times a version-checked wallet write is retried before the
/// operation fails with [`LedgerError::Concurrency`].
pub const MAX_VERSION_RETRIES: u32 = 5;

/// Parameters for a credit grant.
#[derive(Debug, Clone)]
pub struct GrantParams {
    /// The user receiving the credits.
    pub user_id: UserId,
    /// Whether the credits were purchased or granted as a bonus.
    pub kind: GrantKind,
    /// Number of credits to add. Must be positive.
    pub amount: i64,
    /// Human-readable description for the transaction log.
    pub description: String,
    /// External reference (payment session, promo code) for idempotency.
    pub reference_id: Option<String>,
    /// Expiry for bonus credits. Ignored for purchases.
    pub expires_at: Option<DateTime<Utc>>,
    /// Arbitrary metadata recorded on the transaction.
    pub metadata: Value,
}

/// The credit ledger.
///
/// Holds the wallet store and the subscription meter behind trait objects
/// so tests can substitute either side.
pub struct CreditLedger {
    store: Arc<dyn WalletStore>,
    meter: Arc<dyn SubscriptionMeter>,
}

impl CreditLedger {
    /// Create a new ledger over the given store and meter.
    #[must_use]
    pub fn new(store: Arc<dyn WalletStore>, meter: Arc<dyn SubscriptionMeter>) -> Self {
        Self { store, meter }
    }

    /// Get the combined balance for a user.
    ///
    /// Reading the balance of an unknown user reports zeros without
    /// creating a wallet. A failing meter degrades to a wallet-only view
    /// rather than failing the read.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn balance(&self, user_id: &UserId) -> Result<CombinedBalance> {
        let wallet = self.store.get_wallet(user_id)?.map_or(0, |w| w.balance);
        let subscription = self.subscription_balance(user_id).await;
        Ok(CombinedBalance::new(wallet, subscription))
    }

    /// Check whether a user can afford `required` credits, without
    /// mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] for non-positive amounts and
    /// storage errors from the wallet read.
    pub async fn check(&self, user_id: &UserId, required: i64) -> Result<CreditCheck> {
        if required <= 0 {
            return Err(LedgerError::InvalidAmount(
                "check amount must be positive".into(),
            ));
        }
        let balance = self.balance(user_id).await?;
        Ok(CreditCheck::evaluate(balance, required))
    }

    /// Deduct credits, draining the wallet before the subscription.
    ///
    /// The wallet decrement happens first. If the remainder then fails to
    /// debit from the subscription, the wallet decrement is compensated and
    /// the operation fails with no net effect. Usage transactions are only
    /// appended once the outcome is final, so the log never shows a charge
    /// for a failed call. A wallet-only deduction commits its usage entry
    /// atomically with the decrement; entries for a split deduction are
    /// appended after the subscription debit, and an append failure there
    /// is logged with the full payload instead of failing the call.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for non-positive amounts.
    /// - [`LedgerError::InsufficientCredits`] when the combined balance
    ///   cannot cover the amount. Nothing is mutated in this case.
    /// - [`LedgerError::ExternalService`] when the subscription debit fails
    ///   after the pre-check. The wallet is restored first.
    /// - [`LedgerError::Concurrency`] when the wallet stays contended
    ///   through all retries.
    pub async fn deduct(
        &self,
        user_id: &UserId,
        amount: i64,
        description: &str,
        reference_id: Option<String>,
        metadata: Value,
    ) -> Result<Deduction> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(
                "deduction amount must be positive".into(),
            ));
        }

        for _ in 0..MAX_VERSION_RETRIES {
            let wallet = self.store.get_or_create_wallet(user_id)?;
            let wallet_deducted = wallet.balance.min(amount);
            let remaining = amount - wallet_deducted;

            // Pre-check the subscription before touching the wallet so a
            // plainly unaffordable deduction mutates nothing.
            let subscription = if remaining > 0 {
                self.subscription_balance(user_id).await
            } else {
                0
            };
            if wallet_deducted + subscription < amount {
                return Err(LedgerError::InsufficientCredits {
                    balance: wallet.balance + subscription,
                    required: amount,
                });
            }

            if remaining == 0 {
                // The outcome is already final here, so the usage entry
                // commits atomically with the decrement.
                let tx = Transaction::usage(
                    *user_id,
                    wallet_deducted,
                    description.to_string(),
                    reference_id.clone(),
                    metadata.clone(),
                );
                match self.store.apply_wallet_delta(
                    user_id,
                    wallet.version,
                    &WalletDelta::balance(-wallet_deducted),
                    Some(&tx),
                ) {
                    Ok(_) => {
                        tracing::info!(user_id = %user_id, amount, "Credits deducted from wallet");
                        return Ok(Deduction {
                            wallet_deducted,
                            subscription_deducted: 0,
                        });
                    }
                    Err(StoreError::VersionConflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            if wallet_deducted > 0 {
                match self.store.apply_wallet_delta(
                    user_id,
                    wallet.version,
                    &WalletDelta::balance(-wallet_deducted),
                    None,
                ) {
                    Ok(_) => {}
                    Err(StoreError::VersionConflict { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            // The wallet is already decremented. The guard restores it if
            // anything below fails before disarm.
            let guard = CompensationGuard::new(self.store.as_ref(), *user_id, wallet_deducted);

            match self.meter.debit(user_id, remaining).await {
                Ok(()) => {
                    guard.disarm();
                    if wallet_deducted > 0 {
                        self.append_usage(&Transaction::usage(
                            *user_id,
                            wallet_deducted,
                            description.to_string(),
                            reference_id.clone(),
                            metadata.clone(),
                        ));
                    }
                    self.append_usage(&Transaction::usage(
                        *user_id,
                        remaining,
                        format!("{description} (subscription)"),
                        reference_id,
                        with_source(&metadata, "subscription"),
                    ));

                    tracing::info!(
                        user_id = %user_id,
                        amount,
                        wallet_deducted,
                        subscription_deducted = remaining,
                        "Credits deducted across wallet and subscription"
                    );
                    return Ok(Deduction {
                        wallet_deducted,
                        subscription_deducted: remaining,
                    });
                }
                Err(MeterError::InsufficientAllowance {
                    remaining: allowance,
                    ..
                }) => {
                    // Allowance moved between the pre-check and the debit.
                    drop(guard);
                    return Err(LedgerError::InsufficientCredits {
                        balance: wallet.balance + allowance.max(0),
                        required: amount,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        error = %e,
                        wallet_deducted,
                        "Subscription debit failed, compensating wallet"
                    );
                    drop(guard);
                    return Err(LedgerError::ExternalService {
                        service: "subscription-meter".into(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(LedgerError::Concurrency {
            user_id: user_id.to_string(),
        })
    }

    /// Grant credits to a user's wallet.
    ///
    /// Grants carrying a reference are idempotent: replaying the same grant
    /// is a no-op, while reusing the reference with a different amount is
    /// rejected. The reference check runs inside the store's wallet
    /// critical section, so concurrent deliveries of one payment credit
    /// the wallet exactly once. The balance change and its transaction
    /// commit atomically.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for non-positive amounts.
    /// - [`LedgerError::DuplicateReference`] when the reference was already
    ///   used with different parameters.
    /// - [`LedgerError::Concurrency`] when the wallet stays contended
    ///   through all retries.
    pub async fn grant(&self, params: GrantParams) -> Result<Wallet> {
        if params.amount <= 0 {
            return Err(LedgerError::InvalidAmount(
                "grant amount must be positive".into(),
            ));
        }

        for _ in 0..MAX_VERSION_RETRIES {
            let wallet = self.store.get_or_create_wallet(&params.user_id)?;

            let (delta, tx) = match params.kind {
                GrantKind::Purchase => (
                    WalletDelta {
                        balance: params.amount,
                        purchased: params.amount,
                        ..WalletDelta::default()
                    },
                    Transaction::purchase(
                        params.user_id,
                        params.amount,
                        params.description.clone(),
                        params.reference_id.clone(),
                        params.metadata.clone(),
                    ),
                ),
                GrantKind::Bonus => (
                    WalletDelta {
                        balance: params.amount,
                        bonus: params.amount,
                        expires_at: params.expires_at,
                        ..WalletDelta::default()
                    },
                    Transaction::bonus(
                        params.user_id,
                        params.amount,
                        params.description.clone(),
                        params.reference_id.clone(),
                        params.metadata.clone(),
                    ),
                ),
            };

            match self
                .store
                .apply_grant(&params.user_id, wallet.version, &delta, &tx)
            {
                Ok(updated) => {
                    tracing::info!(
                        user_id = %params.user_id,
                        amount = params.amount,
                        kind = ?params.kind,
                        "Credits granted"
                    );
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(StoreError::DuplicateReference { reference_id }) => {
                    return self.resolve_reference_reuse(&params, &reference_id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Concurrency {
            user_id: params.user_id.to_string(),
        })
    }

    /// Decide whether a grant rejected for reference reuse was a replay.
    ///
    /// A recorded grant of the same kind and amount means this delivery is
    /// a redelivery and succeeds as a no-op; anything else is a genuine
    /// duplicate.
    fn resolve_reference_reuse(&self, params: &GrantParams, reference_id: &str) -> Result<Wallet> {
        let existing = self
            .store
            .find_transactions_by_reference(&params.user_id, reference_id)?;
        for tx in &existing {
            if tx.transaction_type == params.kind.transaction_type() && tx.amount == params.amount {
                tracing::info!(
                    user_id = %params.user_id,
                    reference_id = %reference_id,
                    "Grant already applied, returning current wallet"
                );
                return Ok(self.store.get_or_create_wallet(&params.user_id)?);
            }
        }
        Err(LedgerError::DuplicateReference {
            reference_id: reference_id.to_string(),
        })
    }

    /// Refund credits to a user's wallet.
    ///
    /// Unlike grants, refunds require an existing wallet; refunding a user
    /// who never held credits is a caller bug.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for non-positive amounts.
    /// - [`LedgerError::WalletNotFound`] when the user has no wallet.
    /// - [`LedgerError::Concurrency`] when the wallet stays contended
    ///   through all retries.
    pub async fn refund(
        &self,
        user_id: &UserId,
        amount: i64,
        description: &str,
        reference_id: Option<String>,
        metadata: Value,
    ) -> Result<Wallet> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(
                "refund amount must be positive".into(),
            ));
        }

        for _ in 0..MAX_VERSION_RETRIES {
            let wallet = self
                .store
                .get_wallet(user_id)?
                .ok_or_else(|| LedgerError::WalletNotFound {
                    user_id: user_id.to_string(),
                })?;

            let tx = Transaction::refund(
                *user_id,
                amount,
                description.to_string(),
                reference_id.clone(),
                metadata.clone(),
            );

            match self.store.apply_wallet_delta(
                user_id,
                wallet.version,
                &WalletDelta::balance(amount),
                Some(&tx),
            ) {
                Ok(updated) => {
                    tracing::info!(user_id = %user_id, amount, "Credits refunded");
                    return Ok(updated);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(LedgerError::Concurrency {
            user_id: user_id.to_string(),
        })
    }

    /// List a user's transaction history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        Ok(self.store.list_transactions_by_user(user_id, limit, offset)?)
    }

    /// Append a usage entry for a debit that already stands.
    ///
    /// The balances are final by the time this runs; a failed append is
    /// logged with the full payload so reconciliation tooling can replay
    /// it, rather than failing a deduction that did happen.
    fn append_usage(&self, transaction: &Transaction) {
        if let Err(e) = self.store.put_transaction(transaction) {
            let payload = serde_json::to_string(transaction)
                .unwrap_or_else(|_| format!("{transaction:?}"));
            tracing::error!(
                user_id = %transaction.user_id,
                error = %e,
                payload = %payload,
                "Usage entry lost, transaction log diverges from balances"
            );
        }
    }

    /// Read the subscription allowance, degrading to zero on failure.
    async fn subscription_balance(&self, user_id: &UserId) -> i64 {
        match self.meter.check_balance(user_id).await {
            Ok(balance) => balance.max(0),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Subscription meter unavailable, treating allowance as zero"
                );
                0
            }
        }
    }
}

/// Restores a wallet decrement unless disarmed.
///
/// Armed between the wallet write and the subscription debit during a
/// deduction. Dropping the guard while armed re-credits the wallet, so
/// every early return and error path compensates without repeating itself.
struct CompensationGuard<'a> {
    store: &'a dyn WalletStore,
    user_id: UserId,
    amount: i64,
    armed: bool,
}

impl<'a> CompensationGuard<'a> {
    fn new(store: &'a dyn WalletStore, user_id: UserId, amount: i64) -> Self {
        Self {
            store,
            user_id,
            amount,
            armed: amount > 0,
        }
    }

    /// Mark the deduction final; the wallet decrement stands.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CompensationGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;

        for _ in 0..MAX_VERSION_RETRIES {
            let wallet = match self.store.get_or_create_wallet(&self.user_id) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!(
                        user_id = %self.user_id,
                        amount = self.amount,
                        error = %e,
                        "Compensation failed to read wallet, credits lost"
                    );
                    return;
                }
            };
            match self.store.apply_wallet_delta(
                &self.user_id,
                wallet.version,
                &WalletDelta::balance(self.amount),
                None,
            ) {
                Ok(_) => {
                    tracing::info!(
                        user_id = %self.user_id,
                        amount = self.amount,
                        "Wallet decrement compensated"
                    );
                    return;
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => {
                    tracing::error!(
                        user_id = %self.user_id,
                        amount = self.amount,
                        error = %e,
                        "Compensation write failed, credits lost"
                    );
                    return;
                }
            }
        }

        tracing::error!(
            user_id = %self.user_id,
            amount = self.amount,
            "Compensation exhausted retries, credits lost"
        );
    }
}

/// Merge a `source` marker into transaction metadata.
fn with_source(metadata: &Value, source: &str) -> Value {
    match metadata {
        Value::Object(map) => {
            let mut map = map.clone();
            map.insert("source".to_string(), Value::String(source.to_string()));
            Value::Object(map)
        }
        Value::Null => serde_json::json!({ "source": source }),
        other => serde_json::json!({ "source": source, "metadata": other }),
    }
}
