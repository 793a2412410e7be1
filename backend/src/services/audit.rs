//! Consistency auditor: replays the ledger and compares it to the register
//!
//! Read-only. Drift is returned as data, never raised as an error.

use std::sync::Arc;

use shared::{Product, StockAudit, StockMovement};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::StockStore;

/// Fold a product's ledger and compare the result with its register
pub fn audit_chain(product: &Product, movements: &[StockMovement]) -> StockAudit {
    let mut expected_previous = 0i64;
    let mut computed_stock = 0i64;
    let mut broken_at = None;

    for movement in movements {
        if broken_at.is_none()
            && (movement.previous_stock != expected_previous || !movement.is_self_consistent())
        {
            broken_at = Some(movement.id);
        }
        computed_stock = computed_stock.saturating_add(movement.signed_quantity());
        expected_previous = movement.new_stock;
    }

    StockAudit {
        product_id: product.id,
        consistent: broken_at.is_none() && computed_stock == product.current_stock,
        computed_stock,
        registered_stock: product.current_stock,
        broken_at,
        movement_count: movements.len(),
    }
}

/// Detects drift between a product's ledger and register
pub struct ConsistencyAuditor<S> {
    store: Arc<S>,
}

impl<S> Clone for ConsistencyAuditor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StockStore> ConsistencyAuditor<S> {
    /// Create a new ConsistencyAuditor instance
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Audit one product
    pub async fn audit_product(&self, product_id: Uuid) -> LedgerResult<StockAudit> {
        let (product, movements) = self.store.snapshot(product_id).await?;
        let audit = audit_chain(&product, &movements);

        if !audit.consistent {
            tracing::warn!(
                product_id = %audit.product_id,
                computed_stock = audit.computed_stock,
                registered_stock = audit.registered_stock,
                broken_at = ?audit.broken_at,
                "Stock drift detected"
            );
        }

        Ok(audit)
    }

    /// Audit every product in a company, or in all companies
    pub async fn audit_scope(&self, company_id: Option<Uuid>) -> LedgerResult<Vec<StockAudit>> {
        let product_ids = self.store.product_ids(company_id).await?;
        let mut audits = Vec::with_capacity(product_ids.len());

        for product_id in product_ids {
            match self.audit_product(product_id).await {
                Ok(audit) => audits.push(audit),
                // Deleted since the id list was read
                Err(LedgerError::NotFound(_)) => {
                    tracing::debug!(%product_id, "Product vanished during audit sweep");
                }
                Err(err) => return Err(err),
            }
        }

        let drifted = audits.iter().filter(|a| !a.consistent).count();
        tracing::info!(audited = audits.len(), drifted, "Audit sweep finished");

        Ok(audits)
    }
}
