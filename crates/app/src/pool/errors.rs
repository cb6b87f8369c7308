//! Pool errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out after {0:?} waiting for a database connection")]
    Timeout(Duration),

    #[error("connection pool is shut down")]
    Closed,

    #[error("failed to open database connection")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("no healthy database connection after {attempts} attempts")]
    Unhealthy { attempts: usize },

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),
}
