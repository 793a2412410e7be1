//! In-process store for tests and local development
//!
//! Register and ledger share one state lock so a commit is never observed
//! half-applied. Per-product `tokio` mutexes serialize units of work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use rust_decimal::Decimal;
use shared::{LowStockFilter, Pagination, Product, StockLevels, StockMovement};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{CatalogStore, RegisterRow, StockStore, StockTransaction};
use crate::config::LedgerSettings;
use crate::error::{LedgerError, LedgerResult};

/// Points in a commit where a one-shot failure can be injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Before anything is written
    BeforeCommit,
    /// After the ledger append, before the register write
    AfterLedgerWrite,
    /// At commit, as if another writer had moved the register first
    ConcurrentWrite,
}

#[derive(Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    ledger: HashMap<Uuid, Vec<StockMovement>>,
}

struct Inner {
    state: RwLock<MemoryState>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    faults: Mutex<Vec<FaultPoint>>,
    lock_timeout: Duration,
}

impl Inner {
    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::Infrastructure("memory store state poisoned".to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::Infrastructure("memory store state poisoned".to_string()))
    }

    fn product_lock(&self, product_id: Uuid) -> LedgerResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::Infrastructure("memory store lock table poisoned".to_string()))?;
        Ok(locks.entry(product_id).or_default().clone())
    }

    /// Fail once if `point` is armed
    fn trip(&self, point: FaultPoint) -> LedgerResult<()> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| LedgerError::Infrastructure("fault table poisoned".to_string()))?;
        let Some(pos) = faults.iter().position(|p| *p == point) else {
            return Ok(());
        };
        faults.remove(pos);
        Err(match point {
            FaultPoint::ConcurrentWrite => {
                LedgerError::ConflictRetryable("injected concurrent write".to_string())
            }
            _ => LedgerError::Infrastructure(format!("injected fault at {:?}", point)),
        })
    }
}

/// Thread-safe in-memory register and ledger
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(settings: &LedgerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(MemoryState::default()),
                locks: Mutex::new(HashMap::new()),
                faults: Mutex::new(Vec::new()),
                lock_timeout: settings.lock_timeout,
            }),
        }
    }

    /// Arm a one-shot failure for the next commit reaching `point`
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.inner.faults.lock() {
            faults.push(point);
        }
    }

    /// Overwrite a register value without a ledger entry, as an out-of-band edit would
    pub fn tamper_register(&self, product_id: Uuid, current_stock: i64) -> LedgerResult<()> {
        let mut state = self.inner.write()?;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| LedgerError::product_not_found(product_id))?;
        product.current_stock = current_stock;
        Ok(())
    }

    /// Edit a stored movement in place, as an out-of-band edit would
    pub fn tamper_movement<F>(&self, product_id: Uuid, index: usize, edit: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut StockMovement),
    {
        let mut state = self.inner.write()?;
        let movement = state
            .ledger
            .get_mut(&product_id)
            .and_then(|entries| entries.get_mut(index))
            .ok_or_else(|| LedgerError::NotFound(format!("Movement #{} of {}", index, product_id)))?;
        edit(movement);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&LedgerSettings::default())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        self.inner
            .read()?
            .products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| LedgerError::product_not_found(product_id))
    }

    async fn get_unit_cost(&self, product_id: Uuid) -> LedgerResult<Decimal> {
        self.get_product(product_id).await.map(|p| p.unit_cost)
    }

    async fn sku_exists(&self, company_id: Uuid, sku: &str) -> LedgerResult<bool> {
        Ok(self
            .inner
            .read()?
            .products
            .values()
            .any(|p| p.company_id == company_id && p.sku == sku))
    }

    async fn set_stock_levels(&self, product_id: Uuid, levels: StockLevels) -> LedgerResult<Product> {
        let mut state = self.inner.write()?;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| LedgerError::product_not_found(product_id))?;
        product.min_stock = levels.min_stock;
        product.max_stock = levels.max_stock;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn archive_product(&self, product_id: Uuid) -> LedgerResult<Product> {
        let mut state = self.inner.write()?;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| LedgerError::product_not_found(product_id))?;
        product.is_archived = true;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, product_id: Uuid) -> LedgerResult<()> {
        let mut state = self.inner.write()?;
        if !state.products.contains_key(&product_id) {
            return Err(LedgerError::product_not_found(product_id));
        }
        if state.ledger.get(&product_id).is_some_and(|l| !l.is_empty()) {
            return Err(LedgerError::Conflict {
                resource: "product".to_string(),
                message: "Product has stock movements and can only be archived".to_string(),
            });
        }
        state.products.remove(&product_id);
        state.ledger.remove(&product_id);
        Ok(())
    }

    async fn product_ids(&self, company_id: Option<Uuid>) -> LedgerResult<Vec<Uuid>> {
        let state = self.inner.read()?;
        let mut products: Vec<&Product> = state
            .products
            .values()
            .filter(|p| company_id.map_or(true, |c| p.company_id == c))
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku).then(a.id.cmp(&b.id)));
        Ok(products.into_iter().map(|p| p.id).collect())
    }
}

#[async_trait]
impl StockStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self, product_id: Uuid) -> LedgerResult<MemoryTransaction> {
        let lock = self.inner.product_lock(product_id)?;
        let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%product_id, timeout_ms = self.inner.lock_timeout.as_millis() as u64, "Timed out waiting for product lock");
                LedgerError::Busy(format!("timed out waiting for lock on product {}", product_id))
            })?;

        Ok(MemoryTransaction {
            product_id,
            inner: self.inner.clone(),
            _guard: guard,
            new_product: None,
            movement: None,
            register: None,
        })
    }

    async fn movements_for(&self, product_id: Uuid) -> LedgerResult<Vec<StockMovement>> {
        Ok(self
            .inner
            .read()?
            .ledger
            .get(&product_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn snapshot(&self, product_id: Uuid) -> LedgerResult<(Product, Vec<StockMovement>)> {
        let state = self.inner.read()?;
        let product = state
            .products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| LedgerError::product_not_found(product_id))?;
        let movements = state.ledger.get(&product_id).cloned().unwrap_or_default();
        Ok((product, movements))
    }

    async fn movement_page(
        &self,
        product_id: Uuid,
        pagination: Pagination,
    ) -> LedgerResult<(Vec<StockMovement>, u64)> {
        let state = self.inner.read()?;
        let entries = state.ledger.get(&product_id).map(Vec::as_slice).unwrap_or_default();
        let page = entries
            .iter()
            .rev()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit() as usize)
            .cloned()
            .collect();
        Ok((page, entries.len() as u64))
    }

    fn list_low_stock(&self, filter: LowStockFilter) -> BoxStream<'_, LedgerResult<Product>> {
        let snapshot = match self.inner.read() {
            Ok(state) => {
                let mut low: Vec<Product> = state
                    .products
                    .values()
                    .filter(|p| p.is_low_stock() && filter.matches(p.company_id, p.is_archived))
                    .cloned()
                    .collect();
                low.sort_by(|a, b| a.current_stock.cmp(&b.current_stock).then_with(|| a.sku.cmp(&b.sku)));
                low
            }
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }
}

/// Unit of work against a [`MemoryStore`]; writes are staged until commit
pub struct MemoryTransaction {
    product_id: Uuid,
    inner: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
    new_product: Option<Product>,
    movement: Option<StockMovement>,
    register: Option<(i64, i64)>,
}

impl MemoryTransaction {
    fn check_scope(&self, product_id: Uuid) -> LedgerResult<()> {
        if product_id != self.product_id {
            return Err(LedgerError::Infrastructure(format!(
                "unit of work for product {} cannot write product {}",
                self.product_id, product_id
            )));
        }
        Ok(())
    }

    /// Reject staged writes that could not be applied; runs before anything is touched
    fn verify(&self, state: &MemoryState) -> LedgerResult<()> {
        if self.movement.is_some() != self.register.is_some() {
            return Err(LedgerError::Infrastructure(
                "ledger append and register write must be committed together".to_string(),
            ));
        }

        if let Some(product) = &self.new_product {
            if state.products.contains_key(&product.id) {
                return Err(LedgerError::DuplicateEntry("id".to_string()));
            }
            if state
                .products
                .values()
                .any(|p| p.company_id == product.company_id && p.sku == product.sku)
            {
                return Err(LedgerError::DuplicateEntry("sku".to_string()));
            }
        }

        if let (Some((new_stock, expected_version)), Some(movement)) = (self.register, &self.movement) {
            let current_version = match &self.new_product {
                Some(product) => product.stock_version,
                None => state
                    .products
                    .get(&self.product_id)
                    .map(|p| p.stock_version)
                    .ok_or_else(|| {
                        LedgerError::ConflictRetryable(format!(
                            "product {} disappeared during update",
                            self.product_id
                        ))
                    })?,
            };
            if current_version != expected_version {
                return Err(LedgerError::ConflictRetryable(format!(
                    "product {} is at version {}, expected {}",
                    self.product_id, current_version, expected_version
                )));
            }

            let last_sequence = state
                .ledger
                .get(&self.product_id)
                .and_then(|l| l.last())
                .map_or(0, |m| m.sequence);
            if movement.sequence != last_sequence + 1 {
                return Err(LedgerError::ConflictRetryable(format!(
                    "ledger for product {} already holds sequence {}",
                    self.product_id, movement.sequence
                )));
            }

            if new_stock < 0 || movement.new_stock != new_stock {
                return Err(LedgerError::Infrastructure(format!(
                    "register value {} does not match ledger entry {}",
                    new_stock, movement.new_stock
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl StockTransaction for MemoryTransaction {
    async fn lock_register(&mut self) -> LedgerResult<Option<RegisterRow>> {
        if let Some(product) = &self.new_product {
            return Ok(Some(RegisterRow::from_product(product, None)));
        }
        let state = self.inner.read()?;
        Ok(state.products.get(&self.product_id).map(|p| {
            let last = state
                .ledger
                .get(&self.product_id)
                .and_then(|l| l.last())
                .map(|m| m.created_at);
            RegisterRow::from_product(p, last)
        }))
    }

    async fn insert_product(&mut self, product: &Product) -> LedgerResult<()> {
        self.check_scope(product.id)?;
        self.new_product = Some(product.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> LedgerResult<()> {
        self.check_scope(movement.product_id)?;
        if self.movement.is_some() {
            return Err(LedgerError::Infrastructure(
                "a unit of work records exactly one movement".to_string(),
            ));
        }
        self.movement = Some(movement.clone());
        Ok(())
    }

    async fn write_register(&mut self, new_stock: i64, expected_version: i64) -> LedgerResult<()> {
        self.register = Some((new_stock, expected_version));
        Ok(())
    }

    async fn commit(mut self) -> LedgerResult<()> {
        self.inner.trip(FaultPoint::BeforeCommit)?;

        let inner = self.inner.clone();
        let mut state = inner.write()?;
        self.verify(&state)?;
        inner.trip(FaultPoint::ConcurrentWrite)?;

        let product_id = self.product_id;
        let inserted = match self.new_product.take() {
            Some(product) => {
                state.products.insert(product_id, product);
                true
            }
            None => false,
        };
        let appended = match self.movement.take() {
            Some(movement) => {
                state.ledger.entry(product_id).or_default().push(movement);
                true
            }
            None => false,
        };

        if let Err(err) = inner.trip(FaultPoint::AfterLedgerWrite) {
            if appended {
                if let Some(entries) = state.ledger.get_mut(&product_id) {
                    entries.pop();
                }
            }
            if inserted {
                state.products.remove(&product_id);
                state.ledger.remove(&product_id);
            }
            tracing::warn!(%product_id, error = %err, "Commit failed after ledger write, rolled back");
            return Err(err);
        }

        if let Some((new_stock, _)) = self.register.take() {
            if let Some(product) = state.products.get_mut(&product_id) {
                product.current_stock = new_stock;
                product.stock_version += 1;
                product.updated_at = Utc::now();
            }
        }

        Ok(())
    }

    async fn rollback(self) -> LedgerResult<()> {
        tracing::debug!(product_id = %self.product_id, "Discarding staged stock writes");
        Ok(())
    }
}
