//! HTTP request handlers.

pub mod credits;
pub mod health;
