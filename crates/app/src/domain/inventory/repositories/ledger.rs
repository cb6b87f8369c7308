//! Stock Ledger Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    database::{decode_error, try_get_quantity},
    domain::inventory::models::{ProductId, StockAdjustment, StockLedgerEntry, StockReason},
};

const ADJUST_STOCK_SQL: &str = include_str!("../sql/adjust_stock.sql");
const GET_LEDGER_ENTRIES_SQL: &str = include_str!("../sql/get_ledger_entries.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgStockLedgerRepository;

impl PgStockLedgerRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Apply a stock delta and append its ledger entry.
    ///
    /// Returns `None` when the product does not exist or the delta would take
    /// stock below zero; nothing is written in that case.
    pub(crate) async fn adjust(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        adjustment: &StockAdjustment,
    ) -> Result<Option<StockLedgerEntry>, sqlx::Error> {
        query_as::<Postgres, StockLedgerEntry>(ADJUST_STOCK_SQL)
            .bind(adjustment.product)
            .bind(adjustment.delta)
            .bind(adjustment.reason.as_str())
            .bind(adjustment.event.kind())
            .bind(adjustment.event.related_id())
            .bind(adjustment.operator)
            .bind(adjustment.note.as_deref())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn get_entries(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
    ) -> Result<Vec<StockLedgerEntry>, sqlx::Error> {
        query_as::<Postgres, StockLedgerEntry>(GET_LEDGER_ENTRIES_SQL)
            .bind(product)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for StockLedgerEntry {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let reason: String = row.try_get("reason")?;

        Ok(Self {
            id: row.try_get("id")?,
            product: row.try_get("product_id")?,
            change: row.try_get("change_quantity")?,
            stock_before: try_get_quantity(row, "stock_before")?,
            stock_after: try_get_quantity(row, "stock_after")?,
            reason: reason
                .parse::<StockReason>()
                .map_err(|error| decode_error("reason", error))?,
            related_type: row.try_get("related_type")?,
            related_id: row.try_get("related_id")?,
            operator: row.try_get("operator_id")?,
            note: row.try_get("note")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
        })
    }
}
