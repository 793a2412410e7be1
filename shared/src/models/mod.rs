//! Domain models for the stock ledger

mod audit;
mod movement;
mod product;

pub use audit::*;
pub use movement::*;
pub use product::*;
