//! Low-stock reporter
//!
//! Reads the register only; each call is a fresh snapshot.

use std::sync::Arc;

use futures::stream::{BoxStream, TryStreamExt};
use shared::{LowStockFilter, Product};

use crate::error::LedgerResult;
use crate::store::StockStore;

/// Lists products at or below their minimum stock
pub struct LowStockReporter<S> {
    store: Arc<S>,
}

impl<S> Clone for LowStockReporter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StockStore> LowStockReporter<S> {
    /// Create a new LowStockReporter instance
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Products in scope with `current_stock <= min_stock`, lowest stock first
    pub fn list_low_stock(&self, filter: LowStockFilter) -> BoxStream<'_, LedgerResult<Product>> {
        self.store.list_low_stock(filter)
    }

    /// Collect the whole low-stock list
    pub async fn collect_low_stock(&self, filter: LowStockFilter) -> LedgerResult<Vec<Product>> {
        let products: Vec<Product> = self.list_low_stock(filter).try_collect().await?;
        tracing::debug!(count = products.len(), "Low-stock report built");
        Ok(products)
    }
}
