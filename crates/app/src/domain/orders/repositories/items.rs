//! Order Items Repository

use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    database::{amount_param, quantity_param, try_get_amount, try_get_quantity},
    domain::orders::models::{NewOrderItem, OrderId, OrderItem},
};

const CREATE_ORDER_ITEM_SQL: &str = include_str!("../sql/create_order_item.sql");
const GET_ORDER_ITEMS_SQL: &str = include_str!("../sql/get_order_items.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgOrderItemsRepository;

impl PgOrderItemsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn create_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
        items: &[NewOrderItem],
    ) -> Result<Vec<OrderItem>, sqlx::Error> {
        let mut created = Vec::with_capacity(items.len());

        for item in items {
            let row = query_as::<Postgres, OrderItem>(CREATE_ORDER_ITEM_SQL)
                .bind(order)
                .bind(item.product)
                .bind(&item.product_name)
                .bind(amount_param(item.price)?)
                .bind(quantity_param(item.quantity)?)
                .bind(amount_param(item.subtotal)?)
                .fetch_one(&mut **tx)
                .await?;

            created.push(row);
        }

        Ok(created)
    }

    pub(crate) async fn get_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: OrderId,
    ) -> Result<Vec<OrderItem>, sqlx::Error> {
        query_as::<Postgres, OrderItem>(GET_ORDER_ITEMS_SQL)
            .bind(order)
            .fetch_all(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for OrderItem {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            order: row.try_get("order_id")?,
            product: row.try_get("product_id")?,
            product_name: row.try_get("product_name")?,
            price: try_get_amount(row, "price")?,
            quantity: try_get_quantity(row, "quantity")?,
            subtotal: try_get_amount(row, "subtotal")?,
        })
    }
}
