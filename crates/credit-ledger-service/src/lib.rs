//! Credit Ledger HTTP API Service.
//!
//! This crate provides the HTTP API for the credit ledger, including:
//!
//! - Combined balance reads (wallet plus subscription allowance)
//! - Credit checks, deductions, grants, and refunds
//! - Transaction history
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **User JWT tokens** - For end-user reads (dashboard, etc.)
//! 2. **Service API keys** - For service-to-service mutations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for consistency

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{CreditLedger, GrantParams};
pub use routes::create_router;
pub use state::AppState;
