//! Service configuration.

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/credit-ledger").
    pub data_dir: String,

    /// HMAC secret for validating user JWTs. User endpoints reject all
    /// requests when unset.
    pub auth_secret: Option<String>,

    /// Expected JWT audience (default: "credit-ledger").
    pub auth_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Subscription metering API URL (optional).
    pub meter_api_url: Option<String>,

    /// Subscription metering API key (optional).
    pub meter_api_key: Option<String>,

    /// The metered feature credits are drawn against.
    pub meter_feature_id: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/credit-ledger".into()),
            auth_secret: std::env::var("AUTH_SECRET").ok(),
            auth_audience: std::env::var("AUTH_AUDIENCE")
                .unwrap_or_else(|_| "credit-ledger".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            meter_api_url: std::env::var("METER_API_URL").ok(),
            meter_api_key: std::env::var("METER_API_KEY").ok(),
            meter_feature_id: std::env::var("METER_FEATURE_ID")
                .unwrap_or_else(|_| "messages".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/credit-ledger".into(),
            auth_secret: None,
            auth_audience: "credit-ledger".into(),
            service_api_key: None,
            meter_api_url: None,
            meter_api_key: None,
            meter_feature_id: "messages".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
