//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, health};
use crate::state::AppState;

/// Maximum concurrent requests for ledger mutation endpoints.
/// These endpoints handle high-volume traffic from upstream services, so
/// they get a higher limit but are still protected from overload.
const LEDGER_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Credits (user JWT auth)
/// - `GET /v1/credits/balance` - Get combined balance
/// - `GET /v1/credits/transactions` - List transaction history
///
/// ## Ledger (Service API Key auth, rate-limited)
/// - `POST /v1/credits/check` - Check affordability
/// - `POST /v1/credits/deduct` - Deduct credits
/// - `POST /v1/credits/grant` - Grant credits
/// - `POST /v1/credits/refund` - Refund credits
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // User-facing reads
    let user_routes = Router::new()
        .route("/balance", get(credits::get_balance))
        .route("/transactions", get(credits::list_transactions));

    // Mutation endpoints called per message by upstream services, with
    // their own concurrency limit
    let ledger_routes = Router::new()
        .route("/check", post(credits::check))
        .route("/deduct", post(credits::deduct))
        .route("/grant", post(credits::grant))
        .route("/refund", post(credits::refund))
        .layer(ConcurrencyLimitLayer::new(LEDGER_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .nest("/credits", user_routes.merge(ledger_routes))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
