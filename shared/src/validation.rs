//! Validation utilities for the stock ledger

use rust_decimal::Decimal;
use validator::ValidationError;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validate SKU format (1-64 characters of uppercase alphanumerics, `-` or `_`)
pub fn validate_sku(sku: &str) -> Result<(), ValidationError> {
    if sku.is_empty() || sku.len() > 64 {
        return Err(error("sku_length", "SKU must be between 1 and 64 characters"));
    }
    if !sku
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(error(
            "sku_format",
            "SKU must be uppercase alphanumeric, '-' or '_' only",
        ));
    }
    Ok(())
}

/// Decimal places the ledger stores for costs
pub const MAX_COST_SCALE: u32 = 4;

/// Validate a unit cost is not negative and fits the stored precision
pub fn validate_unit_cost(cost: &Decimal) -> Result<(), ValidationError> {
    if cost.is_sign_negative() && !cost.is_zero() {
        return Err(error("unit_cost_negative", "Unit cost cannot be negative"));
    }
    if cost.normalize().scale() > MAX_COST_SCALE {
        return Err(error(
            "unit_cost_scale",
            "Unit cost can have at most 4 decimal places",
        ));
    }
    Ok(())
}

/// Validate minimum/maximum stock configuration
pub fn validate_stock_levels(min_stock: i64, max_stock: Option<i64>) -> Result<(), ValidationError> {
    if min_stock < 0 {
        return Err(error("min_stock_negative", "Minimum stock cannot be negative"));
    }
    match max_stock {
        Some(max) if max < 0 => Err(error("max_stock_negative", "Maximum stock cannot be negative")),
        Some(max) if max < min_stock => Err(error(
            "stock_levels_inverted",
            "Maximum stock must not be below minimum stock",
        )),
        _ => Ok(()),
    }
}

/// Validate the identifier of whoever triggered a movement
pub fn validate_actor_id(actor_id: &str) -> Result<(), ValidationError> {
    let trimmed = actor_id.trim();
    if trimmed.is_empty() {
        return Err(error("actor_required", "Actor id is required"));
    }
    if trimmed.len() > 128 {
        return Err(error("actor_length", "Actor id must be at most 128 characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sku() {
        assert!(validate_sku("CUP-12_OZ").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("lower").is_err());
        assert!(validate_sku(&"A".repeat(65)).is_err());
    }

    #[test]
    fn test_unit_cost() {
        assert!(validate_unit_cost(&Decimal::ZERO).is_ok());
        assert!(validate_unit_cost(&Decimal::new(1550, 2)).is_ok());
        assert!(validate_unit_cost(&Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn test_unit_cost_scale() {
        assert!(validate_unit_cost(&Decimal::new(12345, 4)).is_ok());
        // Trailing zeros do not count
        assert!(validate_unit_cost(&Decimal::new(1_500_000, 5)).is_ok());
        assert!(validate_unit_cost(&Decimal::new(5, 5)).is_err());
        assert!(validate_unit_cost(&Decimal::new(123_456, 5)).is_err());
    }

    #[test]
    fn test_stock_levels() {
        assert!(validate_stock_levels(10, None).is_ok());
        assert!(validate_stock_levels(10, Some(10)).is_ok());
        assert!(validate_stock_levels(10, Some(9)).is_err());
        assert!(validate_stock_levels(-1, None).is_err());
    }

    #[test]
    fn test_actor_id() {
        assert!(validate_actor_id("u1").is_ok());
        assert!(validate_actor_id("   ").is_err());
        assert!(validate_actor_id(&"x".repeat(129)).is_err());
    }

    proptest! {
        #[test]
        fn prop_levels_accept_ordered_pairs(min in 0i64..10_000, extra in 0i64..10_000) {
            prop_assert!(validate_stock_levels(min, Some(min + extra)).is_ok());
        }
    }
}
