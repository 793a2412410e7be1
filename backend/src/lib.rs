//! Stock ledger backend
//!
//! Keeps each product's current stock in lockstep with an append-only
//! history of stock movements. All stock changes go through
//! [`services::MovementEngine`]; the auditor and low-stock reporter only read.

pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::{Config, LedgerSettings};
pub use error::{ErrorDetail, ErrorResponse, LedgerError, LedgerResult};
pub use services::{
    ApplyMovementInput, CatalogService, ConsistencyAuditor, LowStockReporter, MovementEngine,
    TransferStockInput,
};
pub use store::{
    CatalogStore, FaultPoint, MemoryStore, PgStore, StockStore, StockTransaction,
};
