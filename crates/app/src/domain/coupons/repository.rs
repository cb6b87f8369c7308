//! Coupons Repository

use jiff_sqlx::Timestamp as SqlxTimestamp;
use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as, query_scalar};

use crate::{
    database::{try_get_amount, try_get_optional_amount},
    domain::{
        coupons::models::{
            Coupon, CouponId, DiscountKind, UserCoupon, UserCouponId, UserCouponStatus,
        },
        orders::models::OrderId,
    },
    ids::UserId,
};

const FIND_COUPON_BY_CODE_SQL: &str = include_str!("sql/find_coupon_by_code.sql");
const LOCK_UNUSED_GRANT_SQL: &str = include_str!("sql/lock_unused_grant.sql");
const MARK_GRANT_USED_SQL: &str = include_str!("sql/mark_grant_used.sql");
const RESTORE_GRANTS_FOR_ORDER_SQL: &str = include_str!("sql/restore_grants_for_order.sql");
const GET_COUPON_CODE_FOR_ORDER_SQL: &str = include_str!("sql/get_coupon_code_for_order.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCouponsRepository;

impl PgCouponsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn find_coupon_by_code(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        code: &str,
    ) -> Result<Option<Coupon>, sqlx::Error> {
        query_as::<Postgres, Coupon>(FIND_COUPON_BY_CODE_SQL)
            .bind(code)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Lock the user's oldest unused grant of `coupon`.
    pub(crate) async fn lock_unused_grant(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
        coupon: CouponId,
    ) -> Result<Option<UserCoupon>, sqlx::Error> {
        query_as::<Postgres, UserCoupon>(LOCK_UNUSED_GRANT_SQL)
            .bind(user)
            .bind(coupon)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Spend a grant on `order`. Returns `false` if it was already used.
    pub(crate) async fn mark_used(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        grant: UserCouponId,
        order: OrderId,
    ) -> Result<bool, sqlx::Error> {
        let rows_affected = query(MARK_GRANT_USED_SQL)
            .bind(grant)
            .bind(order)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected == 1)
    }

    /// Return every grant spent on `order` to `unused` and clear the link.
    pub(crate) async fn restore_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Vec<UserCouponId>, sqlx::Error> {
        query_scalar::<Postgres, UserCouponId>(RESTORE_GRANTS_FOR_ORDER_SQL)
            .bind(order)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn coupon_code_for_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Option<String>, sqlx::Error> {
        query_scalar::<Postgres, String>(GET_COUPON_CODE_FOR_ORDER_SQL)
            .bind(order)
            .fetch_optional(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for Coupon {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            kind: if kind == "percentage" {
                DiscountKind::Percentage
            } else {
                DiscountKind::Fixed
            },
            value: try_get_amount(row, "value")?,
            min_amount: try_get_amount(row, "min_amount")?,
            max_discount: try_get_optional_amount(row, "max_discount")?,
            active: status == "active",
            starts_at: row
                .try_get::<Option<SqlxTimestamp>, _>("starts_at")?
                .map(SqlxTimestamp::to_jiff),
            ends_at: row
                .try_get::<Option<SqlxTimestamp>, _>("ends_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}

impl<'r> FromRow<'r, PgRow> for UserCoupon {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            user: row.try_get("user_id")?,
            coupon: row.try_get("coupon_id")?,
            status: if status == "used" {
                UserCouponStatus::Used
            } else {
                UserCouponStatus::Unused
            },
            order: row.try_get("order_id")?,
            used_at: row
                .try_get::<Option<SqlxTimestamp>, _>("used_at")?
                .map(SqlxTimestamp::to_jiff),
        })
    }
}
