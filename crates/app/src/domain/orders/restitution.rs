//! Reversal of an order's side effects on cancellation or refund.

use std::collections::BTreeMap;

use sqlx::{Postgres, Transaction};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    coupons::repository::PgCouponsRepository,
    inventory::{
        models::{ProductId, StockAdjustment, StockEvent, StockReason},
        repositories::{PgProductsRepository, PgStockLedgerRepository},
    },
    orders::{
        models::{Order, StockChange},
        repositories::{PgOrderItemsRepository, PgOrdersRepository, PgPurchaseRecordsRepository},
    },
};

#[derive(Debug, Error)]
pub(crate) enum RestitutionError {
    #[error("product {0} disappeared while restoring stock")]
    MissingProduct(ProductId),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Restitution {
    pub coupons_restored: usize,
    pub stock_changes: Vec<StockChange>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PgRestitution {
    orders: PgOrdersRepository,
    items: PgOrderItemsRepository,
    products: PgProductsRepository,
    ledger: PgStockLedgerRepository,
    coupons: PgCouponsRepository,
    purchases: PgPurchaseRecordsRepository,
}

impl PgRestitution {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the order's coupons and stock and drop its purchase records.
    ///
    /// Stock is only returned when the order still holds a deduction, and the
    /// flag is cleared afterwards, so running this twice restores nothing twice.
    pub(crate) async fn reverse(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
        reason: StockReason,
        event: StockEvent,
        operator: Option<i64>,
    ) -> Result<Restitution, RestitutionError> {
        let coupons_restored = self.coupons.restore_for_order(tx, order.id).await?.len();

        self.purchases.delete_for_order(tx, order.id).await?;

        let mut stock_changes = Vec::new();

        if order.stock_deducted {
            let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();

            for item in self.items.get_items(tx, order.id).await? {
                *quantities.entry(item.product).or_default() += item.quantity;
            }

            let products: Vec<ProductId> = quantities.keys().copied().collect();
            self.products.lock_products(tx, &products).await?;

            for (product, quantity) in quantities {
                let adjustment = StockAdjustment::restore(product, quantity, reason, event, operator)?;

                let entry = self
                    .ledger
                    .adjust(tx, &adjustment)
                    .await?
                    .ok_or(RestitutionError::MissingProduct(product))?;

                stock_changes.push(StockChange::from(&entry));
            }

            self.orders.set_stock_deducted(tx, order.id, false).await?;
        }

        debug!(
            order_id = %order.id,
            coupons_restored,
            products_restocked = stock_changes.len(),
            reason = reason.as_str(),
            "order side effects reversed"
        );

        Ok(Restitution {
            coupons_restored,
            stock_changes,
        })
    }
}
