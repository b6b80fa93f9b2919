//! Core types for the credit ledger.
//!
//! This crate provides the foundational types shared by the ledger crates:
//!
//! - **Identifiers**: `UserId`, `TransactionId`
//! - **Wallets**: `Wallet`, the persistent per-user credit balance
//! - **Transactions**: `Transaction`, `TransactionType`, the append-only audit log
//! - **Balance views**: `CombinedBalance`, `CreditCheck`, `Deduction`
//!
//! # Credit Unit
//!
//! Credits are whole integers stored as `i64`. A wallet balance is the number
//! of credits currently spendable; subscription allowance is metered
//! externally and never persisted here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod balance;
pub mod error;
pub mod ids;
pub mod transaction;
pub mod wallet;

pub use balance::{CombinedBalance, CreditCheck, Deduction, FundingSource};
pub use error::{LedgerError, Result};
pub use ids::{IdError, TransactionId, UserId};
pub use transaction::{GrantKind, Transaction, TransactionType};
pub use wallet::Wallet;
