//! Read-side report models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scope for the low-stock report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockFilter {
    /// Restrict to one company; all companies when absent
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub include_archived: bool,
}

impl LowStockFilter {
    pub fn for_company(company_id: Uuid) -> Self {
        Self {
            company_id: Some(company_id),
            include_archived: false,
        }
    }

    /// Whether a product in `company_id` with the given archive flag is in scope
    pub fn matches(&self, company_id: Uuid, is_archived: bool) -> bool {
        self.company_id.map_or(true, |c| c == company_id) && (self.include_archived || !is_archived)
    }
}

/// Outcome of replaying a product's ledger against its register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    pub product_id: Uuid,
    pub consistent: bool,
    pub computed_stock: i64,
    pub registered_stock: i64,
    /// First movement at which the chain stops adding up
    pub broken_at: Option<Uuid>,
    pub movement_count: usize,
}
