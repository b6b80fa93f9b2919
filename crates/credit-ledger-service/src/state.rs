//! Application state.

use std::sync::Arc;

use credit_ledger_meter::{HttpMeter, NoopMeter, SubscriptionMeter};
use credit_ledger_store::RocksStore;

use crate::config::ServiceConfig;
use crate::ledger::CreditLedger;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// The credit ledger wired to the store and subscription meter.
    pub ledger: Arc<CreditLedger>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Builds the subscription meter from configuration; when no metering
    /// service is configured the ledger runs wallet-only.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let meter: Arc<dyn SubscriptionMeter> = match config
            .meter_api_url
            .as_ref()
            .zip(config.meter_api_key.as_ref())
        {
            Some((url, key)) => {
                tracing::info!(meter_url = %url, feature_id = %config.meter_feature_id, "Subscription metering enabled");
                Arc::new(HttpMeter::new(url, key, config.meter_feature_id.clone()))
            }
            None => {
                tracing::warn!("Subscription meter not configured - running wallet-only");
                Arc::new(NoopMeter)
            }
        };

        let ledger = Arc::new(CreditLedger::new(store.clone(), meter));

        Self {
            store,
            ledger,
            config,
        }
    }

    /// Check if a subscription meter is configured.
    #[must_use]
    pub fn has_meter(&self) -> bool {
        self.config.meter_api_url.is_some() && self.config.meter_api_key.is_some()
    }
}
