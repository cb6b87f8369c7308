//! Orders Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::{
    database::{amount_param, decode_error, try_get_amount},
    domain::orders::{
        lifecycle::{OrderStatus, PaymentStatus},
        models::{NewOrderRecord, Order, OrderId},
    },
    ids::UserId,
};

const CREATE_ORDER_SQL: &str = include_str!("../sql/create_order.sql");
const FIND_ORDER_BY_IDEMPOTENCY_KEY_SQL: &str =
    include_str!("../sql/find_order_by_idempotency_key.sql");
const GET_ORDER_SQL: &str = include_str!("../sql/get_order.sql");
const LOCK_ORDER_SQL: &str = include_str!("../sql/lock_order.sql");
const SET_ORDER_STATUS_SQL: &str = include_str!("../sql/set_order_status.sql");
const RECORD_PAYMENT_SQL: &str = include_str!("../sql/record_payment.sql");
const RECORD_SHIPMENT_SQL: &str = include_str!("../sql/record_shipment.sql");
const SET_CANCEL_REASON_SQL: &str = include_str!("../sql/set_cancel_reason.sql");
const SET_STOCK_DEDUCTED_SQL: &str = include_str!("../sql/set_stock_deducted.sql");
const DELETE_ORDER_SQL: &str = include_str!("../sql/delete_order.sql");
const LIST_USER_ORDERS_SQL: &str = include_str!("../sql/list_user_orders.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgOrdersRepository;

impl PgOrdersRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &NewOrderRecord<'_>,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(CREATE_ORDER_SQL)
            .bind(order.order_no)
            .bind(order.user)
            .bind(amount_param(order.subtotal)?)
            .bind(amount_param(order.discount)?)
            .bind(amount_param(order.payable)?)
            .bind(order.shipping_address)
            .bind(order.remark)
            .bind(order.stock_deducted)
            .bind(order.idempotency_key)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn find_by_idempotency_key(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        key: &str,
    ) -> Result<Option<Order>, sqlx::Error> {
        query_as::<Postgres, Order>(FIND_ORDER_BY_IDEMPOTENCY_KEY_SQL)
            .bind(user)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn get_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(GET_ORDER_SQL)
            .bind(order)
            .fetch_one(&mut **tx)
            .await
    }

    /// Read the order and hold its row lock until the transaction ends.
    pub(crate) async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(LOCK_ORDER_SQL)
            .bind(order)
            .fetch_one(&mut **tx)
            .await
    }

    /// Write a status the caller has already validated.
    ///
    /// Entering `paid`, `shipped`, `delivered`, `completed` or `cancelled`
    /// stamps the matching timestamp. `paid_at` keeps its first value.
    pub(crate) async fn set_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        status: OrderStatus,
        payment_status: Option<PaymentStatus>,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(SET_ORDER_STATUS_SQL)
            .bind(order)
            .bind(status.as_str())
            .bind(payment_status.map(PaymentStatus::as_str))
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn record_payment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        method: &str,
        transaction_id: &str,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(RECORD_PAYMENT_SQL)
            .bind(order)
            .bind(method)
            .bind(transaction_id)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn record_shipment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        tracking_number: &str,
        shipping_method: &str,
    ) -> Result<Order, sqlx::Error> {
        query_as::<Postgres, Order>(RECORD_SHIPMENT_SQL)
            .bind(order)
            .bind(tracking_number)
            .bind(shipping_method)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn set_cancel_reason(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        reason: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        query(SET_CANCEL_REASON_SQL)
            .bind(order)
            .bind(reason)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    pub(crate) async fn set_stock_deducted(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        deducted: bool,
    ) -> Result<(), sqlx::Error> {
        query(SET_STOCK_DEDUCTED_SQL)
            .bind(order)
            .bind(deducted)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Delete a cancelled order. Returns the number of rows removed.
    pub(crate) async fn delete_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(DELETE_ORDER_SQL)
            .bind(order)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    pub(crate) async fn list_user_orders(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, sqlx::Error> {
        query_as::<Postgres, Order>(LIST_USER_ORDERS_SQL)
            .bind(user)
            .bind(status.map(OrderStatus::as_str))
            .fetch_all(&mut **tx)
            .await
    }
}

fn optional_timestamp(row: &PgRow, column: &str) -> sqlx::Result<Option<jiff::Timestamp>> {
    Ok(row
        .try_get::<Option<SqlxTimestamp>, _>(column)?
        .map(SqlxTimestamp::to_jiff))
}

impl<'r> FromRow<'r, PgRow> for Order {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;

        Ok(Self {
            id: row.try_get("id")?,
            order_no: row.try_get("order_no")?,
            user: row.try_get("user_id")?,
            subtotal: try_get_amount(row, "subtotal")?,
            discount: try_get_amount(row, "discount")?,
            shipping_fee: try_get_amount(row, "shipping_fee")?,
            payable: try_get_amount(row, "payable")?,
            status: status
                .parse::<OrderStatus>()
                .map_err(|error| decode_error("status", error.to_string()))?,
            payment_status: payment_status
                .parse::<PaymentStatus>()
                .map_err(|error| decode_error("payment_status", error.to_string()))?,
            payment_method: row.try_get("payment_method")?,
            transaction_id: row.try_get("transaction_id")?,
            shipping_address: row.try_get("shipping_address")?,
            remark: row.try_get("remark")?,
            tracking_number: row.try_get("tracking_number")?,
            shipping_method: row.try_get("shipping_method")?,
            cancel_reason: row.try_get("cancel_reason")?,
            stock_deducted: row.try_get("stock_deducted")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            updated_at: row.try_get::<SqlxTimestamp, _>("updated_at")?.to_jiff(),
            paid_at: optional_timestamp(row, "paid_at")?,
            shipped_at: optional_timestamp(row, "shipped_at")?,
            delivered_at: optional_timestamp(row, "delivered_at")?,
            completed_at: optional_timestamp(row, "completed_at")?,
            cancelled_at: optional_timestamp(row, "cancelled_at")?,
        })
    }
}
