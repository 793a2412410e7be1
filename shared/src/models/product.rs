//! Product records as seen by the stock ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{validate_sku, validate_stock_levels, validate_unit_cost};

/// A catalog product together with its stock register fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    /// Tenant/company boundary the product belongs to
    pub company_id: Uuid,
    pub sku: String,
    pub name: String,
    /// Only ever written by the movement engine
    pub current_stock: i64,
    pub min_stock: i64,
    /// Unbounded when absent
    pub max_stock: Option<i64>,
    pub unit_cost: Decimal,
    pub is_archived: bool,
    /// Bumped by every committed movement; equals the sequence of the last one
    pub stock_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Build a fresh product with an empty register from validated attributes
    pub fn from_new(attrs: NewProduct, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id: attrs.company_id,
            sku: attrs.sku,
            name: attrs.name,
            current_stock: 0,
            min_stock: attrs.min_stock,
            max_stock: attrs.max_stock,
            unit_cost: attrs.unit_cost,
            is_archived: false,
            stock_version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the product sits at or below its minimum stock
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.min_stock
    }
}

/// Attributes for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_product_levels", skip_on_field_errors = false))]
pub struct NewProduct {
    pub company_id: Uuid,
    #[validate(custom = "validate_sku")]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 0))]
    pub min_stock: i64,
    #[validate(range(min = 0))]
    pub max_stock: Option<i64>,
    #[validate(custom = "validate_unit_cost")]
    pub unit_cost: Decimal,
}

fn validate_new_product_levels(attrs: &NewProduct) -> Result<(), validator::ValidationError> {
    validate_stock_levels(attrs.min_stock, attrs.max_stock)
}

/// Minimum/maximum stock configuration for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub min_stock: i64,
    pub max_stock: Option<i64>,
}

/// Stock valuation for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockValuation {
    pub product_id: Uuid,
    pub sku: String,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub total_value: Decimal,
}
