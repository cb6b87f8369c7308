//! Purchase Records Repository

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{Postgres, Transaction, query, query_scalar};

use crate::{
    domain::{inventory::models::ProductId, orders::models::OrderId},
    ids::UserId,
};

const GET_PURCHASED_QUANTITY_SQL: &str = include_str!("../sql/get_purchased_quantity.sql");
const RECORD_PURCHASES_FOR_ORDER_SQL: &str =
    include_str!("../sql/record_purchases_for_order.sql");
const DELETE_PURCHASES_FOR_ORDER_SQL: &str =
    include_str!("../sql/delete_purchases_for_order.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgPurchaseRecordsRepository;

impl PgPurchaseRecordsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Units of `product` the user has bought since `since` (ever, when `None`).
    pub(crate) async fn purchased_quantity(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        product: ProductId,
        since: Option<Timestamp>,
    ) -> Result<u32, sqlx::Error> {
        let total = query_scalar::<Postgres, i64>(GET_PURCHASED_QUANTITY_SQL)
            .bind(user)
            .bind(product)
            .bind(since.map(SqlxTimestamp::from))
            .fetch_one(&mut **tx)
            .await?;

        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    /// One record per item of the order, attributed to the order's owner.
    pub(crate) async fn record_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(RECORD_PURCHASES_FOR_ORDER_SQL)
            .bind(order)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn delete_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_PURCHASES_FOR_ORDER_SQL)
            .bind(order)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}
