//! Products Repository

use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    database::{decode_error, try_get_amount, try_get_quantity},
    domain::inventory::models::{LimitPeriod, Product, ProductId, ProductStatus, PurchaseLimit},
};

const LOCK_PRODUCTS_SQL: &str = include_str!("../sql/lock_products.sql");
const GET_PRODUCT_SQL: &str = include_str!("../sql/get_product.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgProductsRepository;

impl PgProductsRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// Lock the given product rows for the rest of the transaction.
    ///
    /// Rows are locked in ascending id order so concurrent checkouts over
    /// overlapping products cannot deadlock. Unknown ids are simply absent.
    pub(crate) async fn lock_products(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        products: &[ProductId],
    ) -> Result<Vec<Product>, sqlx::Error> {
        let ids: Vec<i64> = products.iter().map(|id| id.get()).collect();

        query_as::<Postgres, Product>(LOCK_PRODUCTS_SQL)
            .bind(ids)
            .fetch_all(&mut **tx)
            .await
    }

    pub(crate) async fn get_product(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product: ProductId,
    ) -> Result<Product, sqlx::Error> {
        query_as::<Postgres, Product>(GET_PRODUCT_SQL)
            .bind(product)
            .fetch_one(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for Product {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let limit: Option<i32> = row.try_get("purchase_limit")?;
        let period: Option<String> = row.try_get("limit_period")?;

        let purchase_limit = match limit {
            Some(quantity) => Some(PurchaseLimit {
                quantity: u32::try_from(quantity).map_err(|error| sqlx::Error::ColumnDecode {
                    index: "purchase_limit".to_string(),
                    source: Box::new(error),
                })?,
                period: period
                    .as_deref()
                    .unwrap_or("total")
                    .parse::<LimitPeriod>()
                    .map_err(|error| decode_error("limit_period", error))?,
            }),
            None => None,
        };

        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: try_get_amount(row, "price")?,
            stock_quantity: try_get_quantity(row, "stock_quantity")?,
            status: status
                .parse::<ProductStatus>()
                .map_err(|error| decode_error("status", error))?,
            purchase_limit,
        })
    }
}
