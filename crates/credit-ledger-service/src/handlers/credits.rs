//! Credit balance, deduction, grant, and refund handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use credit_ledger_core::{FundingSource, GrantKind, Transaction, UserId, Wallet};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::ledger::GrantParams;
use crate::state::AppState;

/// Combined balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Spendable wallet credits.
    pub wallet: i64,
    /// Remaining subscription allowance (zero when the meter is down).
    pub subscription: i64,
    /// Total spendable credits.
    pub total: i64,
}

/// Get the current combined balance for the authenticated user.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(&auth.user_id).await?;

    Ok(Json(BalanceResponse {
        wallet: balance.wallet,
        subscription: balance.subscription,
        total: balance.total,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Amount (positive = credit, negative = debit).
    pub amount: i64,
    /// Transaction type.
    pub transaction_type: String,
    /// Description.
    pub description: String,
    /// External reference, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Arbitrary metadata.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: format!("{:?}", tx.transaction_type).to_lowercase(),
            description: tx.description.clone(),
            reference_id: tx.reference_id.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the authenticated user's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .ledger
        .transactions(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Credit check request.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// The user to check.
    pub user_id: UserId,
    /// Required amount.
    pub amount: i64,
}

/// Credit check response.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Whether the combined balance covers the amount.
    pub has_enough: bool,
    /// Spendable wallet credits.
    pub wallet: i64,
    /// Remaining subscription allowance.
    pub subscription: i64,
    /// Total spendable credits.
    pub total: i64,
    /// How the amount would be funded.
    pub source: FundingSource,
}

/// Check whether a user can afford an amount, without mutating anything.
pub async fn check(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let check = state.ledger.check(&request.user_id, request.amount).await?;

    Ok(Json(CheckResponse {
        has_enough: check.has_enough,
        wallet: check.balance.wallet,
        subscription: check.balance.subscription,
        total: check.balance.total,
        source: check.source,
    }))
}

/// Deduction request.
#[derive(Debug, Deserialize)]
pub struct DeductRequest {
    /// The user to charge.
    pub user_id: UserId,
    /// Amount to deduct.
    pub amount: i64,
    /// Human-readable description for the transaction log.
    pub description: String,
    /// External reference for the charge (message ID, job ID).
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Arbitrary metadata recorded on the transaction.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Deduction response.
#[derive(Debug, Serialize)]
pub struct DeductResponse {
    /// Credits taken from the wallet.
    pub wallet_deducted: i64,
    /// Credits debited from the subscription allowance.
    pub subscription_deducted: i64,
    /// Total credits deducted.
    pub total_deducted: i64,
}

/// Deduct credits, wallet first.
pub async fn deduct(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(request): Json<DeductRequest>,
) -> Result<Json<DeductResponse>, ApiError> {
    tracing::debug!(
        user_id = %request.user_id,
        amount = request.amount,
        service = %auth.service_name,
        "Deduction requested"
    );

    let deduction = state
        .ledger
        .deduct(
            &request.user_id,
            request.amount,
            &request.description,
            request.reference_id,
            request.metadata,
        )
        .await?;

    Ok(Json(DeductResponse {
        wallet_deducted: deduction.wallet_deducted,
        subscription_deducted: deduction.subscription_deducted,
        total_deducted: deduction.wallet_deducted + deduction.subscription_deducted,
    }))
}

/// Grant request.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// The user receiving the credits.
    pub user_id: UserId,
    /// Whether the credits were purchased or granted as a bonus.
    pub grant_type: GrantKind,
    /// Amount to grant.
    pub amount: i64,
    /// Human-readable description for the transaction log.
    pub description: String,
    /// External reference (payment session, promo code) for idempotency.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Expiry for bonus credits.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Arbitrary metadata recorded on the transaction.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Wallet snapshot returned by mutating endpoints.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    /// Spendable wallet credits.
    pub balance: i64,
    /// Lifetime purchased credits.
    pub purchased_credits: i64,
    /// Lifetime bonus credits.
    pub bonus_credits: i64,
    /// Bonus credit expiry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Last update timestamp.
    pub updated_at: String,
}

impl From<&Wallet> for WalletResponse {
    fn from(wallet: &Wallet) -> Self {
        Self {
            balance: wallet.balance,
            purchased_credits: wallet.purchased_credits,
            bonus_credits: wallet.bonus_credits,
            expires_at: wallet.expires_at.map(|t| t.to_rfc3339()),
            updated_at: wallet.updated_at.to_rfc3339(),
        }
    }
}

/// Grant credits to a user's wallet.
pub async fn grant(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(request): Json<GrantRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    tracing::debug!(
        user_id = %request.user_id,
        amount = request.amount,
        grant_type = ?request.grant_type,
        service = %auth.service_name,
        "Grant requested"
    );

    let wallet = state
        .ledger
        .grant(GrantParams {
            user_id: request.user_id,
            kind: request.grant_type,
            amount: request.amount,
            description: request.description,
            reference_id: request.reference_id,
            expires_at: request.expires_at,
            metadata: request.metadata,
        })
        .await?;

    Ok(Json(WalletResponse::from(&wallet)))
}

/// Refund request.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// The user to refund.
    pub user_id: UserId,
    /// Amount to refund.
    pub amount: i64,
    /// Human-readable description for the transaction log.
    pub description: String,
    /// External reference for the original charge.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Arbitrary metadata recorded on the transaction.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Refund credits to a user's wallet.
pub async fn refund(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(request): Json<RefundRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    tracing::debug!(
        user_id = %request.user_id,
        amount = request.amount,
        service = %auth.service_name,
        "Refund requested"
    );

    let wallet = state
        .ledger
        .refund(
            &request.user_id,
            request.amount,
            &request.description,
            request.reference_id,
            request.metadata,
        )
        .await?;

    Ok(Json(WalletResponse::from(&wallet)))
}
