//! Runtime configuration

use std::time::Duration;

use clap::{Args, ValueEnum};

/// Database settings.
#[derive(Debug, Clone, Args)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,
}

/// Connection pool sizing and housekeeping.
#[derive(Debug, Clone, Args)]
pub struct PoolConfig {
    /// Connections opened when the pool starts
    #[arg(long = "pool-min-idle", env = "POOL_MIN_IDLE", default_value_t = 5)]
    pub min_idle: usize,

    /// Hard ceiling on live connections
    #[arg(long = "pool-max-size", env = "POOL_MAX_SIZE", default_value_t = 20)]
    pub max_size: usize,

    /// Seconds an acquire waits before giving up
    #[arg(long = "pool-acquire-timeout-secs", env = "POOL_ACQUIRE_TIMEOUT_SECS", default_value_t = 30)]
    pub acquire_timeout_secs: u64,

    /// Seconds an idle connection may sit unused before the sweep closes it
    #[arg(long = "pool-idle-timeout-secs", env = "POOL_IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps
    #[arg(long = "pool-sweep-interval-secs", env = "POOL_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 5,
            max_size: 20,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// When inventory leaves the shelf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InventoryPolicy {
    /// Decrement stock while the order is created.
    #[default]
    OnCreate,
    /// Validate at creation, decrement at payment.
    OnPay,
}

/// Order workflow settings.
#[derive(Debug, Clone, Args)]
pub struct OrdersConfig {
    /// When stock is decremented for a new order
    #[arg(long, env = "ORDERS_INVENTORY_POLICY", value_enum, default_value_t = InventoryPolicy::OnCreate)]
    pub inventory_policy: InventoryPolicy,

    /// Largest quantity accepted for a single order line
    #[arg(long, env = "ORDERS_MAX_LINE_QUANTITY", default_value_t = 999)]
    pub max_line_quantity: u32,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            inventory_policy: InventoryPolicy::OnCreate,
            max_line_quantity: 999,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable compact output.
    Compact,
    /// Structured JSON output.
    Json,
}

/// Logging output settings.
#[derive(Debug, Clone, Args)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}
