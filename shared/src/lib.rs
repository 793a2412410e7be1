//! Shared types and models for the stock ledger
//!
//! This crate contains the records and value types exchanged between the
//! ledger backend and whatever presentation layer sits in front of it.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
