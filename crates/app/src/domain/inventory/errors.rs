//! Inventory service errors.

use sqlx::Error;
use thiserror::Error;

use crate::{
    pool::PoolError,
    response::{Coded, ErrorCode},
};

#[derive(Debug, Error)]
pub enum InventoryServiceError {
    #[error("product not found")]
    NotFound,

    #[error("stock adjustment must not be zero")]
    ZeroAdjustment,

    #[error("cannot remove {requested} units of {name}: {available} remaining")]
    InsufficientStock {
        name: String,
        requested: u32,
        available: u32,
    },

    #[error("database connection unavailable")]
    Pool(#[from] PoolError),

    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for InventoryServiceError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        Self::Sql(error)
    }
}

impl Coded for InventoryServiceError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound => ErrorCode::NotFound,
            Self::ZeroAdjustment | Self::InsufficientStock { .. } => ErrorCode::ValidationError,
            Self::Pool(error) => error.code(),
            Self::Sql(_) => ErrorCode::DatabaseError,
        }
    }
}
