//! Refunds Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    database::{amount_param, decode_error, try_get_amount},
    domain::{
        orders::models::OrderId,
        refunds::models::{RefundId, RefundRequest, RefundStatus},
    },
    ids::{AdminId, UserId},
};

const CREATE_REFUND_SQL: &str = include_str!("sql/create_refund.sql");
const FIND_REFUND_FOR_ORDER_SQL: &str = include_str!("sql/find_refund_for_order.sql");
const GET_REFUND_SQL: &str = include_str!("sql/get_refund.sql");
const LOCK_REFUND_SQL: &str = include_str!("sql/lock_refund.sql");
const RECORD_DECISION_SQL: &str = include_str!("sql/record_decision.sql");
const LIST_USER_REFUNDS_SQL: &str = include_str!("sql/list_user_refunds.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgRefundsRepository;

impl PgRefundsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_refund(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        user: UserId,
        reason: &str,
        amount: u64,
    ) -> Result<RefundRequest, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(CREATE_REFUND_SQL)
            .bind(order)
            .bind(user)
            .bind(reason)
            .bind(amount_param(amount)?)
            .fetch_one(&mut **tx)
            .await
    }

    /// Most recent request for `order` in `status`.
    pub(crate) async fn find_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        status: RefundStatus,
    ) -> Result<Option<RefundRequest>, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(FIND_REFUND_FOR_ORDER_SQL)
            .bind(order)
            .bind(status.as_str())
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn get_refund(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        refund: RefundId,
    ) -> Result<RefundRequest, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(GET_REFUND_SQL)
            .bind(refund)
            .fetch_one(&mut **tx)
            .await
    }

    pub(crate) async fn lock_refund(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        refund: RefundId,
    ) -> Result<RefundRequest, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(LOCK_REFUND_SQL)
            .bind(refund)
            .fetch_one(&mut **tx)
            .await
    }

    /// Close a pending request. `None` if it was no longer pending.
    pub(crate) async fn record_decision(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        refund: RefundId,
        status: RefundStatus,
        admin: AdminId,
        reply: Option<&str>,
    ) -> Result<Option<RefundRequest>, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(RECORD_DECISION_SQL)
            .bind(refund)
            .bind(status.as_str())
            .bind(admin)
            .bind(reply)
            .fetch_optional(&mut **tx)
            .await
    }

    pub(crate) async fn list_user_refunds(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<Vec<RefundRequest>, sqlx::Error> {
        query_as::<Postgres, RefundRequest>(LIST_USER_REFUNDS_SQL)
            .bind(user)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for RefundRequest {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            order: row.try_get("order_id")?,
            user: row.try_get("user_id")?,
            reason: row.try_get("reason")?,
            amount: try_get_amount(row, "amount")?,
            status: status
                .parse::<RefundStatus>()
                .map_err(|error| decode_error("status", error))?,
            processed_by: row.try_get("processed_by")?,
            admin_reply: row.try_get("admin_reply")?,
            created_at: row.try_get::<SqlxTimestamp, _>("created_at")?.to_jiff(),
            processed_at: row
                .try_get::<Option<SqlxTimestamp>, _>("processed_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
