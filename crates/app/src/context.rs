//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::{DatabaseConfig, OrdersConfig, PoolConfig},
    database::{self, PgPool, SchemaError},
    domain::{
        inventory::{InventoryService, PgInventoryService},
        orders::{OrdersService, PgOrdersService},
        refunds::{PgRefundsService, RefundsService},
    },
    pool::PoolError,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Pool(#[from] PoolError),

    #[error("failed to verify database schema")]
    Schema(#[from] SchemaError),
}

/// Services wired over one shared pool.
#[derive(Clone)]
pub struct AppContext {
    pub pool: PgPool,
    pub orders: Arc<dyn OrdersService>,
    pub refunds: Arc<dyn RefundsService>,
    pub inventory: Arc<dyn InventoryService>,
}

impl AppContext {
    /// Open the pool, check the schema and build the services.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection can be opened or the schema is
    /// missing a column the services rely on.
    pub async fn from_config(
        database: &DatabaseConfig,
        pool: &PoolConfig,
        orders: &OrdersConfig,
    ) -> Result<Self, AppInitError> {
        let pool = database::connect(&database.database_url, pool).await?;

        {
            let mut conn = pool.acquire().await?;
            database::verify_schema(&mut conn).await?;
        }

        Ok(Self::from_pool(pool, orders.clone()))
    }

    /// Build the services over an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, orders: OrdersConfig) -> Self {
        Self {
            orders: Arc::new(PgOrdersService::new(pool.clone(), orders)),
            refunds: Arc::new(PgRefundsService::new(pool.clone())),
            inventory: Arc::new(PgInventoryService::new(pool.clone())),
            pool,
        }
    }
}
