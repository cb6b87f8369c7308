//! Cart Lines Repository

use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query, query_as};

use crate::{database::try_get_quantity, domain::orders::models::CartLine, ids::UserId};

const GET_SELECTED_CART_LINES_SQL: &str = include_str!("../sql/get_selected_cart_lines.sql");
const CLEAR_SELECTED_CART_LINES_SQL: &str = include_str!("../sql/clear_selected_cart_lines.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgCartLinesRepository;

impl PgCartLinesRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn selected_lines(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<Vec<CartLine>, sqlx::Error> {
        query_as::<Postgres, CartLine>(GET_SELECTED_CART_LINES_SQL)
            .bind(user)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn clear_selected(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user: UserId,
    ) -> Result<u64, sqlx::Error> {
        let rows_affected = query(CLEAR_SELECTED_CART_LINES_SQL)
            .bind(user)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }
}

impl<'r> FromRow<'r, PgRow> for CartLine {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            product: row.try_get("product_id")?,
            quantity: try_get_quantity(row, "quantity")?,
        })
    }
}
