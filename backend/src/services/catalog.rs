//! Catalog-side operations around the ledger: history, valuation, stock
//! levels and product retirement

use std::sync::Arc;

use shared::{
    validate_stock_levels, PaginatedResponse, Pagination, PaginationMeta, Product, StockLevels,
    StockMovement, StockValuation,
};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::StockStore;

/// Catalog service for reading ledger history and configuring products
pub struct CatalogService<S> {
    store: Arc<S>,
}

impl<S> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StockStore> CatalogService<S> {
    /// Create a new CatalogService instance
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn get_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        self.store.get_product(product_id).await
    }

    /// Movements for a product, newest first
    pub async fn movement_history(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> LedgerResult<PaginatedResponse<StockMovement>> {
        // Surface NotFound rather than an empty page
        self.store.get_product(product_id).await?;

        let (data, total_items) = self.store.movement_page(product_id, pagination).await?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(pagination, total_items),
        })
    }

    /// Value of the stock on hand at the product's current unit cost
    pub async fn stock_valuation(&self, product_id: Uuid) -> LedgerResult<StockValuation> {
        let product = self.store.get_product(product_id).await?;
        let unit_cost = self.store.get_unit_cost(product_id).await?;
        let total_value = unit_cost
            .checked_mul(product.current_stock.into())
            .ok_or_else(|| LedgerError::validation("unit_cost", "Valuation is out of range"))?;

        Ok(StockValuation {
            product_id,
            sku: product.sku,
            quantity: product.current_stock,
            unit_cost,
            total_value,
        })
    }

    /// Update minimum/maximum stock; `current_stock` is untouched
    pub async fn set_stock_levels(&self, product_id: Uuid, levels: StockLevels) -> LedgerResult<Product> {
        validate_stock_levels(levels.min_stock, levels.max_stock).map_err(|e| {
            LedgerError::validation(
                "stock_levels",
                e.message.map(|m| m.to_string()).unwrap_or_default(),
            )
        })?;

        let product = self.store.set_stock_levels(product_id, levels).await?;
        tracing::info!(
            %product_id,
            min_stock = product.min_stock,
            max_stock = ?product.max_stock,
            "Stock levels updated"
        );
        Ok(product)
    }

    /// Archive a product; it keeps its ledger but accepts no further movements
    pub async fn archive_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        let product = self.store.archive_product(product_id).await?;
        tracing::info!(%product_id, "Product archived");
        Ok(product)
    }

    /// Hard-delete a product that has never moved stock
    pub async fn delete_product(&self, product_id: Uuid) -> LedgerResult<()> {
        self.store.delete_product(product_id).await?;
        tracing::info!(%product_id, "Product deleted");
        Ok(())
    }
}
