//! Business logic services for the stock ledger

pub mod audit;
pub mod catalog;
pub mod low_stock;
pub mod movement;

pub use audit::ConsistencyAuditor;
pub use catalog::CatalogService;
pub use low_stock::LowStockReporter;
pub use movement::{ApplyMovementInput, MovementEngine, TransferStockInput};
