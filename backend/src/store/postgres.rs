//! PostgreSQL-backed register and ledger
//!
//! A unit of work is one database transaction: the product row is locked with
//! `SELECT ... FOR UPDATE` under a `lock_timeout`, the register update is a
//! compare-and-swap on `stock_version`, and `(product_id, sequence)` is unique
//! in the ledger.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use rust_decimal::Decimal;
use shared::{LowStockFilter, Pagination, Product, StockLevels, StockMovement};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{CatalogStore, RegisterRow, StockStore, StockTransaction};
use crate::error::{LedgerError, LedgerResult};

const SKU_CONSTRAINT: &str = "products_company_sku_key";
const SEQUENCE_CONSTRAINT: &str = "stock_movements_product_sequence_key";
const MOVEMENT_PRODUCT_FK: &str = "stock_movements_product_id_fkey";

/// Map SQLSTATE codes onto the ledger taxonomy; `None` leaves it a database error
pub(crate) fn classify_sqlstate(
    code: Option<&str>,
    constraint: Option<&str>,
    message: &str,
) -> Option<LedgerError> {
    match (code?, constraint) {
        // serialization_failure, deadlock_detected
        ("40001", _) | ("40P01", _) => Some(LedgerError::ConflictRetryable(message.to_string())),
        // lock_not_available (lock_timeout expired)
        ("55P03", _) => Some(LedgerError::Busy(message.to_string())),
        ("23505", Some(SKU_CONSTRAINT)) => Some(LedgerError::DuplicateEntry("sku".to_string())),
        ("23505", Some(SEQUENCE_CONSTRAINT)) => {
            Some(LedgerError::ConflictRetryable(message.to_string()))
        }
        ("23503", Some(MOVEMENT_PRODUCT_FK)) => Some(LedgerError::Conflict {
            resource: "product".to_string(),
            message: "Product has stock movements and can only be archived".to_string(),
        }),
        _ => None,
    }
}

fn classify(err: sqlx::Error) -> LedgerError {
    if let sqlx::Error::Database(db) = &err {
        let code = db.code();
        if let Some(mapped) = classify_sqlstate(code.as_deref(), db.constraint(), db.message()) {
            return mapped;
        }
    }
    LedgerError::Database(err)
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    company_id: Uuid,
    sku: String,
    name: String,
    current_stock: i64,
    min_stock: i64,
    max_stock: Option<i64>,
    unit_cost: Decimal,
    is_archived: bool,
    stock_version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            company_id: r.company_id,
            sku: r.sku,
            name: r.name,
            current_stock: r.current_stock,
            min_stock: r.min_stock,
            max_stock: r.max_stock,
            unit_cost: r.unit_cost,
            is_archived: r.is_archived,
            stock_version: r.stock_version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    company_id: Uuid,
    sequence: i64,
    direction: String,
    reason: String,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    unit_cost: Decimal,
    total_cost: Decimal,
    notes: Option<String>,
    actor_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = LedgerError;

    fn try_from(r: MovementRow) -> LedgerResult<Self> {
        let id = r.id;
        let corrupt = |e: shared::UnknownVariant| {
            LedgerError::Infrastructure(format!("movement {} is unreadable: {}", id, e))
        };
        Ok(StockMovement {
            id: r.id,
            product_id: r.product_id,
            company_id: r.company_id,
            sequence: r.sequence,
            direction: r.direction.parse().map_err(corrupt)?,
            reason: r.reason.parse().map_err(corrupt)?,
            quantity: r.quantity,
            previous_stock: r.previous_stock,
            new_stock: r.new_stock,
            unit_cost: r.unit_cost,
            total_cost: r.total_cost,
            notes: r.notes,
            actor_id: r.actor_id,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LockedRow {
    id: Uuid,
    company_id: Uuid,
    current_stock: i64,
    unit_cost: Decimal,
    is_archived: bool,
    stock_version: i64,
}

/// Register and ledger stored in PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Create a new PgStore instance
    pub fn new(db: PgPool, lock_timeout: Duration) -> Self {
        Self { db, lock_timeout }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn get_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                   is_archived, stock_version, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await
        .map_err(classify)?
        .ok_or_else(|| LedgerError::product_not_found(product_id))?;

        Ok(row.into())
    }

    async fn get_unit_cost(&self, product_id: Uuid) -> LedgerResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>("SELECT unit_cost FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.db)
            .await
            .map_err(classify)?
            .ok_or_else(|| LedgerError::product_not_found(product_id))
    }

    async fn sku_exists(&self, company_id: Uuid, sku: &str) -> LedgerResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE company_id = $1 AND sku = $2)",
        )
        .bind(company_id)
        .bind(sku)
        .fetch_one(&self.db)
        .await
        .map_err(classify)
    }

    async fn set_stock_levels(&self, product_id: Uuid, levels: StockLevels) -> LedgerResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products
            SET min_stock = $1, max_stock = $2, updated_at = now()
            WHERE id = $3
            RETURNING id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                      is_archived, stock_version, created_at, updated_at
            "#,
        )
        .bind(levels.min_stock)
        .bind(levels.max_stock)
        .bind(product_id)
        .fetch_optional(&self.db)
        .await
        .map_err(classify)?
        .ok_or_else(|| LedgerError::product_not_found(product_id))?;

        Ok(row.into())
    }

    async fn archive_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            UPDATE products
            SET is_archived = true, updated_at = now()
            WHERE id = $1
            RETURNING id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                      is_archived, stock_version, created_at, updated_at
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await
        .map_err(classify)?
        .ok_or_else(|| LedgerError::product_not_found(product_id))?;

        Ok(row.into())
    }

    async fn delete_product(&self, product_id: Uuid) -> LedgerResult<()> {
        let mut tx = self.db.begin().await.map_err(classify)?;

        let has_history = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM stock_movements WHERE product_id = $1)",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        if has_history {
            return Err(LedgerError::Conflict {
                resource: "product".to_string(),
                message: "Product has stock movements and can only be archived".to_string(),
            });
        }

        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::product_not_found(product_id));
        }

        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn product_ids(&self, company_id: Option<Uuid>) -> LedgerResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM products
            WHERE ($1::uuid IS NULL OR company_id = $1)
            ORDER BY sku, id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.db)
        .await
        .map_err(classify)
    }
}

#[async_trait]
impl StockStore for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self, product_id: Uuid) -> LedgerResult<PgTransaction> {
        let mut tx = self.db.begin().await.map_err(classify)?;

        // SET does not take bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        Ok(PgTransaction { tx, product_id })
    }

    async fn movements_for(&self, product_id: Uuid) -> LedgerResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, company_id, sequence, direction, reason, quantity,
                   previous_stock, new_stock, unit_cost, total_cost, notes, actor_id, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await
        .map_err(classify)?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    async fn snapshot(&self, product_id: Uuid) -> LedgerResult<(Product, Vec<StockMovement>)> {
        let mut tx = self.db.begin().await.map_err(classify)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let product = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                   is_archived, stock_version, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| LedgerError::product_not_found(product_id))?;

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, company_id, sequence, direction, reason, quantity,
                   previous_stock, new_stock, unit_cost, total_cost, notes, actor_id, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        let movements = rows
            .into_iter()
            .map(StockMovement::try_from)
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok((product.into(), movements))
    }

    async fn movement_page(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<StockMovement>, u64)> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await
        .map_err(classify)?;

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, company_id, sequence, direction, reason, quantity,
                   previous_stock, new_stock, unit_cost, total_cost, notes, actor_id, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY sequence DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(product_id)
        .bind(i64::from(pagination.limit()))
        .bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.db)
        .await
        .map_err(classify)?;

        let movements = rows
            .into_iter()
            .map(StockMovement::try_from)
            .collect::<LedgerResult<Vec<_>>>()?;

        Ok((movements, u64::try_from(total).unwrap_or_default()))
    }

    fn list_low_stock(&self, filter: LowStockFilter) -> BoxStream<'_, LedgerResult<Product>> {
        sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                   is_archived, stock_version, created_at, updated_at
            FROM products
            WHERE current_stock <= min_stock
              AND ($1::uuid IS NULL OR company_id = $1)
              AND ($2 OR NOT is_archived)
            ORDER BY current_stock ASC, sku ASC
            "#,
        )
        .bind(filter.company_id)
        .bind(filter.include_archived)
        .fetch(&self.db)
        .map(|row| row.map(Product::from).map_err(classify))
        .boxed()
    }
}

/// Unit of work backed by one database transaction
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    product_id: Uuid,
}

#[async_trait]
impl StockTransaction for PgTransaction {
    async fn lock_register(&mut self) -> LedgerResult<Option<RegisterRow>> {
        let locked = sqlx::query_as::<_, LockedRow>(
            r#"
            SELECT id, company_id, current_stock, unit_cost, is_archived, stock_version
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(self.product_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;

        let Some(row) = locked else {
            return Ok(None);
        };

        let last_movement_at = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(created_at) FROM stock_movements WHERE product_id = $1",
        )
        .bind(self.product_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(Some(RegisterRow {
            product_id: row.id,
            company_id: row.company_id,
            current_stock: row.current_stock,
            unit_cost: row.unit_cost,
            is_archived: row.is_archived,
            stock_version: row.stock_version,
            last_movement_at,
        }))
    }

    async fn insert_product(&mut self, product: &Product) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, company_id, sku, name, current_stock, min_stock, max_stock, unit_cost,
                is_archived, stock_version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(product.id)
        .bind(product.company_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.current_stock)
        .bind(product.min_stock)
        .bind(product.max_stock)
        .bind(product.unit_cost)
        .bind(product.is_archived)
        .bind(product.stock_version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, company_id, sequence, direction, reason, quantity,
                previous_stock, new_stock, unit_cost, total_cost, notes, actor_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(movement.id)
        .bind(movement.product_id)
        .bind(movement.company_id)
        .bind(movement.sequence)
        .bind(movement.direction.as_str())
        .bind(movement.reason.as_str())
        .bind(movement.quantity)
        .bind(movement.previous_stock)
        .bind(movement.new_stock)
        .bind(movement.unit_cost)
        .bind(movement.total_cost)
        .bind(&movement.notes)
        .bind(&movement.actor_id)
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn write_register(&mut self, new_stock: i64, expected_version: i64) -> LedgerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = $1, stock_version = stock_version + 1, updated_at = now()
            WHERE id = $2 AND stock_version = $3
            "#,
        )
        .bind(new_stock)
        .bind(self.product_id)
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::ConflictRetryable(format!(
                "product {} moved past version {}",
                self.product_id, expected_version
            )));
        }

        Ok(())
    }

    async fn commit(self) -> LedgerResult<()> {
        self.tx.commit().await.map_err(classify)
    }

    async fn rollback(self) -> LedgerResult<()> {
        self.tx.rollback().await.map_err(classify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_failures_are_retryable() {
        let err = classify_sqlstate(Some("40001"), None, "could not serialize access").unwrap();
        assert!(matches!(err, LedgerError::ConflictRetryable(_)));
        let err = classify_sqlstate(Some("40P01"), None, "deadlock detected").unwrap();
        assert!(matches!(err, LedgerError::ConflictRetryable(_)));
    }

    #[test]
    fn test_lock_timeout_is_busy() {
        let err = classify_sqlstate(Some("55P03"), None, "canceling statement due to lock timeout")
            .unwrap();
        assert!(matches!(err, LedgerError::Busy(_)));
    }

    #[test]
    fn test_unique_violations_by_constraint() {
        assert!(matches!(
            classify_sqlstate(Some("23505"), Some(SKU_CONSTRAINT), "dup"),
            Some(LedgerError::DuplicateEntry(field)) if field == "sku"
        ));
        assert!(matches!(
            classify_sqlstate(Some("23505"), Some(SEQUENCE_CONSTRAINT), "dup"),
            Some(LedgerError::ConflictRetryable(_))
        ));
        assert!(classify_sqlstate(Some("23505"), Some("other_key"), "dup").is_none());
    }

    #[test]
    fn test_other_codes_stay_database_errors() {
        assert!(classify_sqlstate(Some("08006"), None, "connection failure").is_none());
        assert!(classify_sqlstate(None, None, "no code").is_none());
    }

    #[test]
    fn test_movement_row_rejects_unknown_labels() {
        let row = MovementRow {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            sequence: 1,
            direction: "SIDEWAYS".to_string(),
            reason: "INITIAL".to_string(),
            quantity: 5,
            previous_stock: 0,
            new_stock: 5,
            unit_cost: Decimal::ONE,
            total_cost: Decimal::from(5),
            notes: None,
            actor_id: "system".to_string(),
            created_at: Utc::now(),
        };
        assert!(matches!(
            StockMovement::try_from(row),
            Err(LedgerError::Infrastructure(_))
        ));
    }
}
