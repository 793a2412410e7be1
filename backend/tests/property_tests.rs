//! Property tests for the ledger invariants over random movement sequences

mod common;

use common::{adjust, Harness};
use proptest::prelude::*;
use stock_ledger::{CatalogStore, LedgerError, StockStore};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_register_matches_ledger(
        initial in 0i64..50,
        deltas in prop::collection::vec((-20i64..20).prop_filter("non-zero", |d| *d != 0), 0..30),
    ) {
        tokio_test::block_on(async {
            let h = Harness::new();
            let p = h.product("PROP", initial, 0).await;
            let mut expected = initial;

            for delta in &deltas {
                match h.engine.apply_movement(adjust(p.id, *delta)).await {
                    Ok(m) => {
                        prop_assert_eq!(m.previous_stock, expected);
                        expected += delta;
                        prop_assert_eq!(m.new_stock, expected);
                    }
                    Err(LedgerError::InsufficientStock { available, .. }) => {
                        prop_assert_eq!(available, expected);
                        prop_assert!(expected + delta < 0);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
                prop_assert!(expected >= 0);
            }

            let product = h.store.get_product(p.id).await.unwrap();
            prop_assert_eq!(product.current_stock, expected);

            let ledger = h.store.movements_for(p.id).await.unwrap();
            let sum: i64 = ledger.iter().map(|m| m.signed_quantity()).sum();
            prop_assert_eq!(sum, expected);
            for pair in ledger.windows(2) {
                prop_assert_eq!(pair[1].previous_stock, pair[0].new_stock);
                prop_assert_eq!(pair[1].sequence, pair[0].sequence + 1);
                prop_assert!(pair[1].created_at >= pair[0].created_at);
            }

            let audit = h.auditor.audit_product(p.id).await.unwrap();
            prop_assert!(audit.consistent);
            Ok(())
        })?;
    }
}
