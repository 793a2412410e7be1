//! Shared fixtures for the ledger integration tests
#![allow(dead_code)]

use rust_decimal::Decimal;
use shared::{MovementReason, NewProduct, Product};
use std::sync::Arc;
use std::time::Duration;
use stock_ledger::{
    ApplyMovementInput, CatalogService, ConsistencyAuditor, LedgerSettings, LowStockReporter,
    MemoryStore, MovementEngine, TransferStockInput,
};
use uuid::Uuid;

pub fn settings() -> LedgerSettings {
    LedgerSettings {
        max_attempts: 3,
        retry_backoff: Duration::from_millis(1),
        lock_timeout: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: MovementEngine<MemoryStore>,
    pub auditor: ConsistencyAuditor<MemoryStore>,
    pub reporter: LowStockReporter<MemoryStore>,
    pub catalog: CatalogService<MemoryStore>,
    pub company_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(settings())
    }

    pub fn with_settings(settings: LedgerSettings) -> Self {
        let store = Arc::new(MemoryStore::new(&settings));
        Self {
            engine: MovementEngine::new(store.clone(), settings),
            auditor: ConsistencyAuditor::new(store.clone()),
            reporter: LowStockReporter::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            store,
            company_id: Uuid::new_v4(),
        }
    }

    pub fn attrs(&self, sku: &str, min_stock: i64) -> NewProduct {
        NewProduct {
            company_id: self.company_id,
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            min_stock,
            max_stock: None,
            unit_cost: Decimal::from(15),
        }
    }

    /// Create a product with `initial_stock` on hand
    pub async fn product(&self, sku: &str, initial_stock: i64, min_stock: i64) -> Product {
        self.engine
            .create_product_with_initial_stock(self.attrs(sku, min_stock), initial_stock, "seed")
            .await
            .expect("seed product")
    }
}

pub fn adjust(product_id: Uuid, signed_quantity: i64) -> ApplyMovementInput {
    movement(product_id, MovementReason::Adjustment, signed_quantity)
}

pub fn movement(product_id: Uuid, reason: MovementReason, signed_quantity: i64) -> ApplyMovementInput {
    ApplyMovementInput {
        product_id,
        reason,
        signed_quantity,
        unit_cost: None,
        actor_id: "u1".to_string(),
        notes: None,
    }
}

pub fn transfer(product_id: Uuid, quantity: i64) -> TransferStockInput {
    TransferStockInput {
        product_id,
        quantity,
        actor_id: "u1".to_string(),
        notes: Some("to back room".to_string()),
    }
}
