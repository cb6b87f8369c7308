//! Inventory service.

use async_trait::async_trait;
use mockall::automock;
use sqlx::{Connection, Postgres, Transaction};
use tracing::info;

use crate::{
    database::{self, PgPool},
    domain::inventory::{
        errors::InventoryServiceError,
        models::{ProductId, StockAdjustment, StockEvent, StockLedgerEntry, StockReason},
        repositories::{PgProductsRepository, PgStockLedgerRepository},
    },
    ids::AdminId,
};

/// Manual stock correction requested by an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualRestock {
    pub product: ProductId,
    pub delta: i32,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PgInventoryService {
    pool: PgPool,
    products: PgProductsRepository,
    ledger: PgStockLedgerRepository,
}

impl PgInventoryService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            products: PgProductsRepository::new(),
            ledger: PgStockLedgerRepository::new(),
        }
    }

    async fn restock_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        admin: AdminId,
        restock: ManualRestock,
    ) -> Result<StockLedgerEntry, InventoryServiceError> {
        let product = self
            .products
            .lock_products(tx, &[restock.product])
            .await?
            .into_iter()
            .next()
            .ok_or(InventoryServiceError::NotFound)?;

        let adjustment = StockAdjustment {
            product: product.id,
            delta: restock.delta,
            reason: StockReason::Manual,
            event: StockEvent::Manual,
            operator: Some(admin.get()),
            note: restock.note,
        };

        self.ledger
            .adjust(tx, &adjustment)
            .await?
            .ok_or(InventoryServiceError::InsufficientStock {
                name: product.name,
                requested: restock.delta.unsigned_abs(),
                available: product.stock_quantity,
            })
    }

    async fn stock_ledger_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, InventoryServiceError> {
        self.products.get_product(tx, product).await?;

        Ok(self.ledger.get_entries(tx, product).await?)
    }
}

#[async_trait]
impl InventoryService for PgInventoryService {
    async fn restock_manually(
        &self,
        admin: AdminId,
        restock: ManualRestock,
    ) -> Result<StockLedgerEntry, InventoryServiceError> {
        if restock.delta == 0 {
            return Err(InventoryServiceError::ZeroAdjustment);
        }

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;
        let result = self.restock_in(&mut tx, admin, restock).await;

        let entry = database::finish(tx, result).await?;

        info!(
            product_id = %entry.product,
            change = entry.change,
            stock_after = entry.stock_after,
            admin_id = %admin,
            "stock adjusted manually"
        );

        Ok(entry)
    }

    async fn stock_ledger(
        &self,
        product: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, InventoryServiceError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let result = self.stock_ledger_in(&mut tx, product).await;

        database::finish(tx, result).await
    }
}

#[automock]
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Apply an operator's stock correction and record it in the ledger.
    async fn restock_manually(
        &self,
        admin: AdminId,
        restock: ManualRestock,
    ) -> Result<StockLedgerEntry, InventoryServiceError>;

    /// Every ledger entry for a product, oldest first.
    async fn stock_ledger(
        &self,
        product: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, InventoryServiceError>;
}
