//! Movement engine: the only writer of stock
//!
//! Every change reads the register under the product's lock, checks that
//! stock stays non-negative, then appends one ledger entry and writes the
//! register in a single unit of work.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    validate_actor_id, validate_unit_cost, MovementDirection, MovementReason, NewProduct, Product,
    StockMovement,
};
use uuid::Uuid;
use validator::Validate;

use crate::config::LedgerSettings;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{RegisterRow, StockStore, StockTransaction};

/// Input for recording a stock change
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyMovementInput {
    pub product_id: Uuid,
    pub reason: MovementReason,
    /// Positive increases stock, negative decreases it; never zero
    pub signed_quantity: i64,
    /// Falls back to the product's catalog cost
    pub unit_cost: Option<Decimal>,
    pub actor_id: String,
    pub notes: Option<String>,
}

/// Input for recording a stock transfer
#[derive(Debug, Clone, Deserialize)]
pub struct TransferStockInput {
    pub product_id: Uuid,
    pub quantity: i64,
    pub actor_id: String,
    pub notes: Option<String>,
}

struct MovementDraft<'a> {
    direction: MovementDirection,
    reason: MovementReason,
    quantity: i64,
    new_stock: i64,
    unit_cost: Decimal,
    actor_id: &'a str,
    notes: Option<&'a String>,
}

/// Build the ledger entry that follows `register`
fn next_movement(register: &RegisterRow, draft: MovementDraft<'_>) -> LedgerResult<StockMovement> {
    let total_cost = draft
        .unit_cost
        .checked_mul(Decimal::from(draft.quantity))
        .ok_or_else(|| LedgerError::validation("unit_cost", "Total cost is out of range"))?;

    // createdAt never runs backwards within a product's ledger
    let now = Utc::now();
    let created_at = register.last_movement_at.map_or(now, |last| last.max(now));

    Ok(StockMovement {
        id: Uuid::new_v4(),
        product_id: register.product_id,
        company_id: register.company_id,
        sequence: register.stock_version + 1,
        direction: draft.direction,
        reason: draft.reason,
        quantity: draft.quantity,
        previous_stock: register.current_stock,
        new_stock: draft.new_stock,
        unit_cost: draft.unit_cost,
        total_cost,
        notes: draft.notes.cloned(),
        actor_id: draft.actor_id.trim().to_string(),
        created_at,
    })
}

fn check_actor(actor_id: &str) -> LedgerResult<()> {
    validate_actor_id(actor_id).map_err(|e| {
        LedgerError::validation(
            "actor_id",
            e.message.map(|m| m.to_string()).unwrap_or_default(),
        )
    })
}

fn ensure_active(register: &RegisterRow) -> LedgerResult<()> {
    if register.is_archived {
        return Err(LedgerError::Conflict {
            resource: "product".to_string(),
            message: format!("Product {} is archived", register.product_id),
        });
    }
    Ok(())
}

/// Lock the register and build the entry for a stock change, with the
/// version the register write must find
async fn plan_apply<T: StockTransaction>(
    tx: &mut T,
    input: &ApplyMovementInput,
) -> LedgerResult<(StockMovement, i64)> {
    let register = tx
        .lock_register()
        .await?
        .ok_or_else(|| LedgerError::product_not_found(input.product_id))?;
    ensure_active(&register)?;

    let quantity = input.signed_quantity.abs();
    let new_stock = register
        .current_stock
        .checked_add(input.signed_quantity)
        .ok_or_else(|| LedgerError::validation("signed_quantity", "Stock would overflow"))?;
    if new_stock < 0 {
        return Err(LedgerError::InsufficientStock {
            product_id: input.product_id,
            available: register.current_stock,
            requested: quantity,
        });
    }

    let movement = next_movement(
        &register,
        MovementDraft {
            direction: MovementDirection::from_signed(input.signed_quantity),
            reason: input.reason,
            quantity,
            new_stock,
            unit_cost: input.unit_cost.unwrap_or(register.unit_cost),
            actor_id: &input.actor_id,
            notes: input.notes.as_ref(),
        },
    )?;

    Ok((movement, register.stock_version))
}

async fn plan_transfer<T: StockTransaction>(
    tx: &mut T,
    input: &TransferStockInput,
) -> LedgerResult<(StockMovement, i64)> {
    let register = tx
        .lock_register()
        .await?
        .ok_or_else(|| LedgerError::product_not_found(input.product_id))?;
    ensure_active(&register)?;

    if input.quantity > register.current_stock {
        return Err(LedgerError::InsufficientStock {
            product_id: input.product_id,
            available: register.current_stock,
            requested: input.quantity,
        });
    }

    let movement = next_movement(
        &register,
        MovementDraft {
            direction: MovementDirection::Neutral,
            reason: MovementReason::Transfer,
            quantity: input.quantity,
            new_stock: register.current_stock,
            unit_cost: register.unit_cost,
            actor_id: &input.actor_id,
            notes: input.notes.as_ref(),
        },
    )?;

    Ok((movement, register.stock_version))
}

/// Roll back a unit of work that was turned down, keeping the original error
async fn abandon<T: StockTransaction>(tx: T, err: LedgerError) -> LedgerError {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!(error = %rollback_err, rejected = %err, "Rollback of rejected change failed");
    }
    err
}

/// Commit on a detached task so a dropped caller cannot abort it halfway
async fn commit_detached<T>(tx: T) -> LedgerResult<()>
where
    T: StockTransaction + 'static,
{
    tokio::spawn(tx.commit())
        .await
        .map_err(|e| LedgerError::Infrastructure(format!("commit task failed: {}", e)))?
}

/// Applies stock changes to the register and ledger together
pub struct MovementEngine<S> {
    store: Arc<S>,
    settings: LedgerSettings,
}

impl<S> Clone for MovementEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settings: self.settings,
        }
    }
}

impl<S: StockStore> MovementEngine<S> {
    /// Create a new MovementEngine instance
    pub fn new(store: Arc<S>, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Record a purchase, sale, return or adjustment
    pub async fn apply_movement(&self, input: ApplyMovementInput) -> LedgerResult<StockMovement> {
        if input.signed_quantity == 0 || input.signed_quantity == i64::MIN {
            return Err(LedgerError::validation(
                "signed_quantity",
                "Quantity must be a non-zero amount",
            ));
        }
        match input.reason {
            MovementReason::Transfer => {
                return Err(LedgerError::validation(
                    "reason",
                    "Transfers are recorded with transfer_stock",
                ))
            }
            MovementReason::Initial => {
                return Err(LedgerError::validation(
                    "reason",
                    "Initial stock is only recorded when a product is created",
                ))
            }
            _ => {}
        }
        if let Some(cost) = &input.unit_cost {
            validate_unit_cost(cost).map_err(|e| {
                LedgerError::validation(
                    "unit_cost",
                    e.message.map(|m| m.to_string()).unwrap_or_default(),
                )
            })?;
        }
        check_actor(&input.actor_id)?;

        let movement = self
            .with_retry("apply_movement", input.product_id, || self.try_apply(&input))
            .await?;

        tracing::info!(
            product_id = %movement.product_id,
            movement_id = %movement.id,
            reason = %movement.reason,
            direction = %movement.direction,
            quantity = movement.quantity,
            previous_stock = movement.previous_stock,
            new_stock = movement.new_stock,
            actor_id = %movement.actor_id,
            "Stock movement recorded"
        );

        Ok(movement)
    }

    /// Create a product and, when `initial_stock > 0`, its opening movement in one unit
    pub async fn create_product_with_initial_stock(
        &self,
        attrs: NewProduct,
        initial_stock: i64,
        actor_id: &str,
    ) -> LedgerResult<Product> {
        attrs.validate()?;
        check_actor(actor_id)?;
        if initial_stock < 0 {
            return Err(LedgerError::validation(
                "initial_stock",
                "Initial stock cannot be negative",
            ));
        }
        if self.store.sku_exists(attrs.company_id, &attrs.sku).await? {
            return Err(LedgerError::DuplicateEntry("sku".to_string()));
        }

        let product = Product::from_new(attrs, Utc::now());
        let product = self
            .with_retry("create_product", product.id, || {
                self.try_create(product.clone(), initial_stock, actor_id)
            })
            .await?;

        tracing::info!(
            product_id = %product.id,
            company_id = %product.company_id,
            sku = %product.sku,
            initial_stock,
            actor_id = %actor_id.trim(),
            "Product created"
        );

        Ok(product)
    }

    /// Record a transfer: validated against available stock, no net register change
    pub async fn transfer_stock(&self, input: TransferStockInput) -> LedgerResult<StockMovement> {
        if input.quantity <= 0 {
            return Err(LedgerError::validation(
                "quantity",
                "Transfer quantity must be positive",
            ));
        }
        check_actor(&input.actor_id)?;

        let movement = self
            .with_retry("transfer_stock", input.product_id, || self.try_transfer(&input))
            .await?;

        tracing::info!(
            product_id = %movement.product_id,
            movement_id = %movement.id,
            quantity = movement.quantity,
            stock = movement.new_stock,
            actor_id = %movement.actor_id,
            "Stock transfer recorded"
        );

        Ok(movement)
    }

    /// Run `attempt` until it stops reporting a concurrent writer, at most
    /// `max_attempts` times, then give up with `Busy`.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        product_id: Uuid,
        mut attempt: F,
    ) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<T>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(LedgerError::ConflictRetryable(reason)) => {
                    if tries >= self.settings.max_attempts {
                        tracing::warn!(
                            operation,
                            %product_id,
                            attempts = tries,
                            %reason,
                            "Giving up after repeated concurrent updates"
                        );
                        return Err(LedgerError::Busy(format!(
                            "{} on product {} kept conflicting after {} attempts",
                            operation, product_id, tries
                        )));
                    }
                    tracing::debug!(operation, %product_id, attempt = tries, %reason, "Retrying after conflict");
                    tokio::time::sleep(self.settings.backoff_for(tries)).await;
                    tries += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_apply(&self, input: &ApplyMovementInput) -> LedgerResult<StockMovement> {
        let mut tx = self.store.begin(input.product_id).await?;
        let (movement, expected_version) = match plan_apply(&mut tx, input).await {
            Ok(planned) => planned,
            Err(err) => return Err(abandon(tx, err).await),
        };

        tx.append_movement(&movement).await?;
        tx.write_register(movement.new_stock, expected_version).await?;
        commit_detached(tx).await?;

        Ok(movement)
    }

    async fn try_create(
        &self,
        mut product: Product,
        initial_stock: i64,
        actor_id: &str,
    ) -> LedgerResult<Product> {
        let mut tx = self.store.begin(product.id).await?;
        tx.insert_product(&product).await?;

        if initial_stock > 0 {
            let register = RegisterRow::from_product(&product, None);
            let movement = next_movement(
                &register,
                MovementDraft {
                    direction: MovementDirection::In,
                    reason: MovementReason::Initial,
                    quantity: initial_stock,
                    new_stock: initial_stock,
                    unit_cost: product.unit_cost,
                    actor_id,
                    notes: None,
                },
            )?;
            tx.append_movement(&movement).await?;
            tx.write_register(initial_stock, register.stock_version).await?;

            product.current_stock = initial_stock;
            product.stock_version = movement.sequence;
        }

        commit_detached(tx).await?;
        Ok(product)
    }

    async fn try_transfer(&self, input: &TransferStockInput) -> LedgerResult<StockMovement> {
        let mut tx = self.store.begin(input.product_id).await?;
        let (movement, expected_version) = match plan_transfer(&mut tx, input).await {
            Ok(planned) => planned,
            Err(err) => return Err(abandon(tx, err).await),
        };

        tx.append_movement(&movement).await?;
        // Same value, but the version bump keeps the ledger sequence in step
        tx.write_register(movement.new_stock, expected_version).await?;
        commit_detached(tx).await?;

        Ok(movement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(current_stock: i64, stock_version: i64) -> RegisterRow {
        RegisterRow {
            product_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            current_stock,
            unit_cost: Decimal::from(15),
            is_archived: false,
            stock_version,
            last_movement_at: None,
        }
    }

    #[test]
    fn test_next_movement_values_the_change() {
        let reg = register(50, 3);
        let movement = next_movement(
            &reg,
            MovementDraft {
                direction: MovementDirection::Out,
                reason: MovementReason::Adjustment,
                quantity: 45,
                new_stock: 5,
                unit_cost: Decimal::from(15),
                actor_id: " u1 ",
                notes: None,
            },
        )
        .unwrap();

        assert_eq!(movement.sequence, 4);
        assert_eq!(movement.previous_stock, 50);
        assert_eq!(movement.new_stock, 5);
        assert_eq!(movement.total_cost, Decimal::from(675));
        assert_eq!(movement.actor_id, "u1");
        assert!(movement.is_self_consistent());
    }

    #[test]
    fn test_next_movement_never_moves_time_backwards() {
        let mut reg = register(1, 1);
        let future = Utc::now() + chrono::Duration::seconds(60);
        reg.last_movement_at = Some(future);
        let movement = next_movement(
            &reg,
            MovementDraft {
                direction: MovementDirection::In,
                reason: MovementReason::Purchase,
                quantity: 1,
                new_stock: 2,
                unit_cost: Decimal::ONE,
                actor_id: "u1",
                notes: None,
            },
        )
        .unwrap();
        assert_eq!(movement.created_at, future);
    }

    #[test]
    fn test_archived_products_reject_movements() {
        let mut reg = register(5, 1);
        reg.is_archived = true;
        assert!(matches!(ensure_active(&reg), Err(LedgerError::Conflict { .. })));
    }

    #[test]
    fn test_actor_is_required() {
        assert!(matches!(
            check_actor("  "),
            Err(LedgerError::Validation { field, .. }) if field == "actor_id"
        ));
    }
}
