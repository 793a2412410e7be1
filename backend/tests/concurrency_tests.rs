//! Concurrency tests
//!
//! Writes to one product are serialized; writes to different products are not.

mod common;

use common::{adjust, settings, Harness};
use std::sync::Arc;
use std::time::Duration;
use stock_ledger::{CatalogStore, LedgerError, LedgerSettings, StockStore};
use tokio::sync::Barrier;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_never_oversell() {
    const CALLERS: usize = 25;
    const STOCK: i64 = 7;

    let h = Arc::new(Harness::new());
    let id = h.product("RACE", STOCK, 0).await.id;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let mut handles = Vec::with_capacity(CALLERS);
    for _ in 0..CALLERS {
        let h = h.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            h.engine.apply_movement(adjust(id, -1)).await
        }));
    }

    let mut successes = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(LedgerError::InsufficientStock { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error {:?}", other),
        }
    }

    assert_eq!(successes, STOCK as usize);
    assert_eq!(insufficient, CALLERS - STOCK as usize);
    assert_eq!(h.store.get_product(id).await.unwrap().current_stock, 0);

    let audit = h.auditor.audit_product(id).await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.movement_count, 1 + STOCK as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixed_changes_lose_no_updates() {
    let h = Arc::new(Harness::new());
    let id = h.product("MIXED", 100, 0).await.id;

    let mut handles = Vec::new();
    for i in 0..40 {
        let h = h.clone();
        let delta = if i % 2 == 0 { 3 } else { -2 };
        handles.push(tokio::spawn(async move {
            h.engine.apply_movement(adjust(id, delta)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 20 * 3 - 20 * 2
    assert_eq!(h.store.get_product(id).await.unwrap().current_stock, 120);
    let ledger = h.store.movements_for(id).await.unwrap();
    assert_eq!(ledger.len(), 41);
    assert!(ledger
        .iter()
        .enumerate()
        .all(|(i, m)| m.sequence == i as i64 + 1));
    assert!(h.auditor.audit_product(id).await.unwrap().consistent);
}

#[tokio::test]
async fn test_held_lock_does_not_block_other_products() {
    let h = Harness::new();
    let a = h.product("LOCKA", 5, 0).await;
    let b = h.product("LOCKB", 5, 0).await;

    let _held = h.store.begin(a.id).await.unwrap();

    let m = tokio::time::timeout(
        Duration::from_millis(500),
        h.engine.apply_movement(adjust(b.id, -1)),
    )
    .await
    .expect("product B must not wait on product A")
    .unwrap();
    assert_eq!(m.new_stock, 4);
}

#[tokio::test]
async fn test_lock_wait_is_bounded() {
    let h = Harness::with_settings(LedgerSettings {
        lock_timeout: Duration::from_millis(50),
        ..settings()
    });
    let p = h.product("SLOW", 5, 0).await;

    let held = h.store.begin(p.id).await.unwrap();
    let err = h.engine.apply_movement(adjust(p.id, -1)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Busy(_)));
    assert!(err.is_retryable());
    drop(held);

    let m = h.engine.apply_movement(adjust(p.id, -1)).await.unwrap();
    assert_eq!(m.new_stock, 4);
}

#[tokio::test]
async fn test_cancelled_before_commit_has_no_effect() {
    let h = Harness::new();
    let p = h.product("CANCEL", 5, 0).await;

    let held = h.store.begin(p.id).await.unwrap();
    // Caller gives up while still waiting for the lock
    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        h.engine.apply_movement(adjust(p.id, -3)),
    )
    .await;
    assert!(abandoned.is_err());
    drop(held);

    let product = h.store.get_product(p.id).await.unwrap();
    assert_eq!(product.current_stock, 5);
    assert_eq!(h.store.movements_for(p.id).await.unwrap().len(), 1);
}
