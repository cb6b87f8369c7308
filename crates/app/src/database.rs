//! Database connection management

use async_trait::async_trait;
use sqlx::{
    Connection, PgConnection, Postgres, Row, Transaction, error::BoxDynError, migrate::MigrateError,
    postgres::PgRow, query_scalar,
};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    config::PoolConfig,
    pool::{ManageConnection, Pool, PoolBuilder, PoolError, PooledConnection},
};

const HAS_COLUMN_SQL: &str = include_str!("sql/has_column.sql");

/// Columns the order engine reads or writes, checked once at startup.
const REQUIRED_COLUMNS: &[(&str, &str)] = &[
    ("products", "stock_quantity"),
    ("products", "purchase_limit"),
    ("orders", "payable"),
    ("orders", "stock_deducted"),
    ("orders", "idempotency_key"),
    ("orders", "shipped_at"),
    ("orders", "delivered_at"),
    ("orders", "completed_at"),
    ("order_items", "subtotal"),
    ("user_coupons", "order_id"),
    ("refund_requests", "admin_reply"),
    ("stock_logs", "stock_before"),
    ("user_purchase_records", "purchased_at"),
    ("user_notifications", "related_id"),
];

/// Opens `PostgreSQL` sessions for the connection pool.
#[derive(Debug, Clone)]
pub struct PgConnectionManager {
    url: String,
}

impl PgConnectionManager {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<PgConnection, sqlx::Error> {
        PgConnection::connect(&self.url).await
    }

    async fn is_valid(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        conn.ping().await
    }

    fn has_broken(&self, _conn: &mut PgConnection) -> bool {
        false
    }

    async fn close(&self, conn: PgConnection) {
        if let Err(error) = conn.close().await {
            warn!(error = %error, "failed to close connection cleanly");
        }
    }
}

/// Pool of `PostgreSQL` connections.
pub type PgPool = Pool<PgConnectionManager>;

/// Connection borrowed from a [`PgPool`].
pub type PgPooledConnection = PooledConnection<PgConnectionManager>;

/// Connect to `PostgreSQL` through a bounded pool.
///
/// # Errors
///
/// Returns an error if the warm set cannot be opened.
pub async fn connect(database_url: &str, config: &PoolConfig) -> Result<PgPool, PoolError> {
    PoolBuilder::from_config(config)
        .build(PgConnectionManager::new(database_url))
        .await
}

/// Commit on success, roll back explicitly on failure.
///
/// A failed rollback is logged and the original error is returned.
///
/// # Errors
///
/// Returns the operation's error, or the commit error when committing fails.
pub async fn finish<T, E>(tx: Transaction<'_, Postgres>, result: Result<T, E>) -> Result<T, E>
where
    E: From<sqlx::Error>,
{
    match result {
        Ok(value) => {
            tx.commit().await?;

            Ok(value)
        }
        Err(failure) => {
            if let Err(rollback) = tx.rollback().await {
                error!(error = %rollback, "failed to roll back transaction");
            }

            Err(failure)
        }
    }
}

/// Apply the embedded migrations.
///
/// # Errors
///
/// Returns an error when a migration fails to apply.
pub async fn migrate(conn: &mut PgConnection) -> Result<(), MigrateError> {
    sqlx::migrate!("../../migrations").run(conn).await
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("column {table}.{column} is missing; run `db migrate`")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("failed to inspect schema")]
    Sql(#[from] sqlx::Error),
}

/// Whether `table.column` exists in the current schema.
///
/// # Errors
///
/// Returns an error when the catalog query fails.
pub async fn has_column(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
) -> Result<bool, sqlx::Error> {
    query_scalar::<Postgres, bool>(HAS_COLUMN_SQL)
        .bind(table)
        .bind(column)
        .fetch_one(conn)
        .await
}

/// Fail fast when the database is behind the migrations this build expects.
///
/// # Errors
///
/// Returns [`SchemaError::MissingColumn`] for the first absent column.
pub async fn verify_schema(conn: &mut PgConnection) -> Result<(), SchemaError> {
    for &(table, column) in REQUIRED_COLUMNS {
        if !has_column(conn, table, column).await? {
            return Err(SchemaError::MissingColumn { table, column });
        }
    }

    Ok(())
}

/// Decode failure for a text column holding an unknown enum value.
pub(crate) fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

/// Decode a `BIGINT` money column into minor units.
pub(crate) fn try_get_amount(row: &PgRow, column: &str) -> sqlx::Result<u64> {
    let value: i64 = row.try_get(column)?;

    u64::try_from(value).map_err(|error| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(error),
    })
}

/// Decode an optional `BIGINT` money column into minor units.
pub(crate) fn try_get_optional_amount(row: &PgRow, column: &str) -> sqlx::Result<Option<u64>> {
    let value: Option<i64> = row.try_get(column)?;

    value
        .map(u64::try_from)
        .transpose()
        .map_err(|error| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(error),
        })
}

/// Decode an `INTEGER` quantity column.
pub(crate) fn try_get_quantity(row: &PgRow, column: &str) -> sqlx::Result<u32> {
    let value: i32 = row.try_get(column)?;

    u32::try_from(value).map_err(|error| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(error),
    })
}

/// Encode minor units for a `BIGINT` column.
pub(crate) fn amount_param(amount: u64) -> sqlx::Result<i64> {
    i64::try_from(amount).map_err(|error| sqlx::Error::Encode(Box::new(error) as BoxDynError))
}

/// Encode a quantity for an `INTEGER` column.
pub(crate) fn quantity_param(quantity: u32) -> sqlx::Result<i32> {
    i32::try_from(quantity).map_err(|error| sqlx::Error::Encode(Box::new(error) as BoxDynError))
}
