//! HTTP metering client implementation.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use credit_ledger_core::UserId;

use crate::{MeterError, SubscriptionMeter};

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    customer_id: &'a str,
    feature_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    balance: i64,
}

#[derive(Debug, Serialize)]
struct TrackRequest<'a> {
    customer_id: &'a str,
    feature_id: &'a str,
    count: i64,
}

#[derive(Debug, Deserialize)]
struct MeterErrorResponse {
    error: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    remaining: Option<i64>,
}

/// HTTP client for the subscription metering service.
#[derive(Debug, Clone)]
pub struct HttpMeter {
    client: Client,
    base_url: String,
    api_key: String,
    feature_id: String,
}

impl HttpMeter {
    /// Create a new metering client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Metering API URL (e.g., `"http://localhost:8288"`)
    /// * `api_key` - Metering API key
    /// * `feature_id` - The metered feature credits are drawn against
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        feature_id: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            feature_id: feature_id.into(),
        }
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, MeterError> {
        let url = format!("{}{path}", self.base_url);
        self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| MeterError::Unavailable(e.to_string()))
    }

    /// Handle API response and convert errors.
    ///
    /// Server errors become [`MeterError::Unavailable`] so callers degrade
    /// the same way as for a connection failure. An `insufficient_allowance`
    /// error code becomes [`MeterError::InsufficientAllowance`] with
    /// `required` filled in by the caller.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        required: i64,
    ) -> Result<T, MeterError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| MeterError::Unavailable(e.to_string()));
        }

        if status.is_server_error() {
            return Err(MeterError::Unavailable(format!("HTTP {status}")));
        }

        let error_body: Result<MeterErrorResponse, _> = response.json().await;
        match error_body {
            Ok(body) => {
                if body.code.as_deref() == Some("insufficient_allowance") {
                    return Err(MeterError::InsufficientAllowance {
                        remaining: body.remaining.unwrap_or(0),
                        required,
                    });
                }
                Err(MeterError::Api {
                    status: status.as_u16(),
                    message: body.error,
                })
            }
            Err(_) => Err(MeterError::Api {
                status: status.as_u16(),
                message: format!("HTTP {status}"),
            }),
        }
    }
}

#[async_trait::async_trait]
impl SubscriptionMeter for HttpMeter {
    async fn check_balance(&self, user_id: &UserId) -> Result<i64, MeterError> {
        let customer_id = user_id.to_string();
        let response = self
            .post(
                "/v1/check",
                &CheckRequest {
                    customer_id: &customer_id,
                    feature_id: &self.feature_id,
                },
            )
            .await?;

        let check: CheckResponse = Self::handle_response(response, 0).await?;
        Ok(check.balance)
    }

    async fn debit(&self, user_id: &UserId, amount: i64) -> Result<(), MeterError> {
        let customer_id = user_id.to_string();
        let response = self
            .post(
                "/v1/track",
                &TrackRequest {
                    customer_id: &customer_id,
                    feature_id: &self.feature_id,
                    count: amount,
                },
            )
            .await?;

        Self::handle_response::<serde_json::Value>(response, amount).await?;
        tracing::debug!(user_id = %user_id, amount, "Subscription debit recorded");
        Ok(())
    }
}
