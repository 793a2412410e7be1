//! Low-stock report tests

mod common;

use common::{adjust, Harness};
use futures::{StreamExt, TryStreamExt};
use shared::LowStockFilter;

#[tokio::test]
async fn test_report_is_sorted_by_stock_then_sku() {
    let h = Harness::new();
    let beans = h.product("BEANS", 2, 5).await;
    let filters = h.product("FILTERS", 0, 10).await;
    let cups = h.product("CUPS", 2, 2).await;
    h.product("LIDS", 50, 10).await;

    let low = h
        .reporter
        .collect_low_stock(LowStockFilter::for_company(h.company_id))
        .await
        .unwrap();

    let ids: Vec<_> = low.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![filters.id, beans.id, cups.id]);
}

#[tokio::test]
async fn test_report_follows_stock_changes() {
    let h = Harness::new();
    let p = h.product("SYRUP", 8, 5).await;
    let filter = LowStockFilter::for_company(h.company_id);

    assert!(h.reporter.collect_low_stock(filter.clone()).await.unwrap().is_empty());

    h.engine.apply_movement(adjust(p.id, -3)).await.unwrap();
    let low = h.reporter.collect_low_stock(filter.clone()).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].current_stock, 5);

    h.engine.apply_movement(adjust(p.id, 1)).await.unwrap();
    assert!(h.reporter.collect_low_stock(filter).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_archived_products_are_opt_in() {
    let h = Harness::new();
    let p = h.product("OLD", 1, 5).await;
    h.catalog.archive_product(p.id).await.unwrap();

    let default_scope = LowStockFilter::for_company(h.company_id);
    assert!(h.reporter.collect_low_stock(default_scope).await.unwrap().is_empty());

    let with_archived = LowStockFilter {
        company_id: Some(h.company_id),
        include_archived: true,
    };
    let low = h.reporter.collect_low_stock(with_archived).await.unwrap();
    assert_eq!(low.len(), 1);
    assert!(low[0].is_archived);
}

#[tokio::test]
async fn test_company_scope() {
    let h = Harness::new();
    let mine = h.product("MINE", 0, 1).await;

    // Same store, another tenant
    let mut other = h.attrs("THEIRS", 1);
    other.company_id = uuid::Uuid::new_v4();
    let theirs = h
        .engine
        .create_product_with_initial_stock(other, 0, "seed")
        .await
        .unwrap();

    let scoped = h
        .reporter
        .collect_low_stock(LowStockFilter::for_company(h.company_id))
        .await
        .unwrap();
    assert_eq!(scoped.iter().map(|p| p.id).collect::<Vec<_>>(), vec![mine.id]);

    let everywhere = h
        .reporter
        .collect_low_stock(LowStockFilter::default())
        .await
        .unwrap();
    assert_eq!(everywhere.len(), 2);
    assert!(everywhere.iter().any(|p| p.id == theirs.id));
}

#[tokio::test]
async fn test_stream_can_be_restarted() {
    let h = Harness::new();
    for sku in ["A1", "A2", "A3"] {
        h.product(sku, 0, 1).await;
    }
    let filter = LowStockFilter::for_company(h.company_id);

    // Abandon the first stream part-way through
    let first: Vec<_> = h
        .reporter
        .list_low_stock(filter.clone())
        .take(1)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    let all: Vec<_> = h.reporter.list_low_stock(filter).try_collect().await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, first[0].id);
}
