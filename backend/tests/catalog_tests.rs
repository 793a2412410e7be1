//! Catalog service tests: history, valuation, levels and retirement

mod common;

use common::{adjust, Harness};
use rust_decimal::Decimal;
use shared::{Pagination, StockLevels};
use stock_ledger::{CatalogStore, LedgerError, StockStore};
use uuid::Uuid;

#[tokio::test]
async fn test_history_is_newest_first_and_paginated() {
    let h = Harness::new();
    let p = h.product("HIST", 10, 0).await;
    for delta in [1, 2, 3, 4] {
        h.engine.apply_movement(adjust(p.id, delta)).await.unwrap();
    }

    let first = h
        .catalog
        .movement_history(p.id, Pagination { page: 1, per_page: 2 })
        .await
        .unwrap();
    assert_eq!(
        first.data.iter().map(|m| m.sequence).collect::<Vec<_>>(),
        vec![5, 4]
    );
    assert_eq!(first.pagination.total_items, 5);
    assert_eq!(first.pagination.total_pages, 3);

    let last = h
        .catalog
        .movement_history(p.id, Pagination { page: 3, per_page: 2 })
        .await
        .unwrap();
    assert_eq!(last.data.len(), 1);
    assert_eq!(last.data[0].sequence, 1);

    let past_end = h
        .catalog
        .movement_history(p.id, Pagination { page: 9, per_page: 2 })
        .await
        .unwrap();
    assert!(past_end.data.is_empty());
}

#[tokio::test]
async fn test_history_of_unknown_product() {
    let h = Harness::new();
    let err = h
        .catalog
        .movement_history(Uuid::new_v4(), Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_valuation_uses_current_unit_cost() {
    let h = Harness::new();
    let p = h.product("VAL", 12, 0).await;
    h.engine.apply_movement(adjust(p.id, -2)).await.unwrap();

    let valuation = h.catalog.stock_valuation(p.id).await.unwrap();
    assert_eq!(valuation.sku, "VAL");
    assert_eq!(valuation.quantity, 10);
    assert_eq!(valuation.unit_cost, Decimal::from(15));
    assert_eq!(valuation.total_value, Decimal::from(150));
}

#[tokio::test]
async fn test_stock_levels_leave_stock_untouched() {
    let h = Harness::new();
    let p = h.product("LEVELS", 7, 0).await;

    let updated = h
        .catalog
        .set_stock_levels(p.id, StockLevels { min_stock: 10, max_stock: Some(40) })
        .await
        .unwrap();
    assert_eq!(updated.min_stock, 10);
    assert_eq!(updated.max_stock, Some(40));
    assert_eq!(updated.current_stock, 7);
    assert!(updated.is_low_stock());
    assert_eq!(h.store.movements_for(p.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_stock_levels_are_rejected() {
    let h = Harness::new();
    let p = h.product("BADLVL", 7, 3).await;

    let err = h
        .catalog
        .set_stock_levels(p.id, StockLevels { min_stock: 10, max_stock: Some(5) })
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
    assert_eq!(h.store.get_product(p.id).await.unwrap().min_stock, 3);
}

#[tokio::test]
async fn test_delete_only_without_history() {
    let h = Harness::new();
    let moved = h.product("MOVED", 4, 0).await;
    let fresh = h.product("FRESH", 0, 0).await;

    let err = h.catalog.delete_product(moved.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }));
    assert!(h.store.get_product(moved.id).await.is_ok());

    h.catalog.delete_product(fresh.id).await.unwrap();
    assert!(matches!(
        h.catalog.get_product(fresh.id).await.unwrap_err(),
        LedgerError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_archive_keeps_history() {
    let h = Harness::new();
    let p = h.product("ARCH", 4, 0).await;

    let archived = h.catalog.archive_product(p.id).await.unwrap();
    assert!(archived.is_archived);
    assert_eq!(archived.current_stock, 4);

    let audit = h.auditor.audit_product(p.id).await.unwrap();
    assert!(audit.consistent);
}
