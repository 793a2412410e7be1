//! Storage for the stock register and the movement ledger
//!
//! Both live behind one unit of work per product: a [`StockTransaction`]
//! holds the product's exclusive lock from [`StockStore::begin`] until it is
//! committed or dropped, and applies its ledger append and register write
//! together or not at all. Dropping an uncommitted unit discards it.

mod memory;
mod postgres;

pub use memory::{FaultPoint, MemoryStore, MemoryTransaction};
pub use postgres::{PgStore, PgTransaction};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use shared::{LowStockFilter, Pagination, Product, StockLevels, StockMovement};
use uuid::Uuid;

use crate::error::LedgerResult;

/// Register row as read under the product's lock
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRow {
    pub product_id: Uuid,
    pub company_id: Uuid,
    pub current_stock: i64,
    pub unit_cost: Decimal,
    pub is_archived: bool,
    pub stock_version: i64,
    pub last_movement_at: Option<DateTime<Utc>>,
}

impl RegisterRow {
    pub fn from_product(product: &Product, last_movement_at: Option<DateTime<Utc>>) -> Self {
        Self {
            product_id: product.id,
            company_id: product.company_id,
            current_stock: product.current_stock,
            unit_cost: product.unit_cost,
            is_archived: product.is_archived,
            stock_version: product.stock_version,
            last_movement_at,
        }
    }
}

/// Product catalog operations the ledger depends on
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch a product, failing with `NotFound` when absent
    async fn get_product(&self, product_id: Uuid) -> LedgerResult<Product>;

    /// Current unit cost of a product
    async fn get_unit_cost(&self, product_id: Uuid) -> LedgerResult<Decimal>;

    /// Unique-key check for a company's SKU
    async fn sku_exists(&self, company_id: Uuid, sku: &str) -> LedgerResult<bool>;

    async fn set_stock_levels(&self, product_id: Uuid, levels: StockLevels) -> LedgerResult<Product>;

    /// Soft-delete: the product stays resolvable for its ledger
    async fn archive_product(&self, product_id: Uuid) -> LedgerResult<Product>;

    /// Hard-delete, rejected with `Conflict` once the product has movements
    async fn delete_product(&self, product_id: Uuid) -> LedgerResult<()>;

    /// Ids of every product in a company, or in all companies
    async fn product_ids(&self, company_id: Option<Uuid>) -> LedgerResult<Vec<Uuid>>;
}

/// Durable register + ledger storage
#[async_trait]
pub trait StockStore: CatalogStore + 'static {
    type Transaction: StockTransaction + 'static;

    /// Open a unit of work scoped to `product_id`.
    ///
    /// Waits at most the configured lock timeout, then fails with `Busy`.
    async fn begin(&self, product_id: Uuid) -> LedgerResult<Self::Transaction>;

    /// Full ledger of a product in ascending sequence order
    async fn movements_for(&self, product_id: Uuid) -> LedgerResult<Vec<StockMovement>>;

    /// Product and full ledger read from one consistent snapshot
    async fn snapshot(&self, product_id: Uuid) -> LedgerResult<(Product, Vec<StockMovement>)>;

    /// One page of a product's ledger, newest first, with the total count
    async fn movement_page(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<StockMovement>, u64)>;

    /// Products at or below their minimum stock, ascending by current stock.
    ///
    /// Each call starts a fresh read.
    fn list_low_stock(&self, filter: LowStockFilter) -> BoxStream<'_, LedgerResult<Product>>;
}

/// A unit of work over one product's register row and ledger
#[async_trait]
pub trait StockTransaction: Send {
    /// Read the register row under the product's exclusive lock
    async fn lock_register(&mut self) -> LedgerResult<Option<RegisterRow>>;

    async fn insert_product(&mut self, product: &Product) -> LedgerResult<()>;

    async fn append_movement(&mut self, movement: &StockMovement) -> LedgerResult<()>;

    /// Set `current_stock` if the row is still at `expected_version`, bumping the version.
    ///
    /// Fails with `ConflictRetryable` when another writer got there first.
    async fn write_register(&mut self, new_stock: i64, expected_version: i64) -> LedgerResult<()>;

    async fn commit(self) -> LedgerResult<()>;

    async fn rollback(self) -> LedgerResult<()>;
}
