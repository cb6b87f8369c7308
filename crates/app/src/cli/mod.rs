use std::fmt::Display;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use storefront_app::{
    config::{DatabaseConfig, LoggingConfig, OrdersConfig, PoolConfig},
    context::AppContext,
    response::{Coded, Envelope},
};

mod db;
mod orders;
mod pool;
mod refunds;
mod stock;

#[derive(Debug, Parser)]
#[command(name = "storefront-app", about = "Storefront order engine CLI", long_about = None)]
pub(crate) struct Cli {
    #[command(flatten, next_help_heading = "Logging")]
    logging: LoggingConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Db(db::DbCommand),
    Pool(pool::PoolCommand),
    Orders(orders::OrdersCommand),
    Refunds(refunds::RefundsCommand),
    Stock(stock::StockCommand),
}

impl Cli {
    pub(crate) fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub(crate) async fn run(self) -> Result<(), String> {
        match self.command {
            Commands::Db(command) => db::run(command).await,
            Commands::Pool(command) => pool::run(command).await,
            Commands::Orders(command) => orders::run(command).await,
            Commands::Refunds(command) => refunds::run(command).await,
            Commands::Stock(command) => stock::run(command).await,
        }
    }
}

/// Connection settings shared by every command that talks to the services.
#[derive(Debug, Args)]
pub(crate) struct ConnectionArgs {
    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten, next_help_heading = "Pool")]
    pool: PoolConfig,

    #[command(flatten, next_help_heading = "Orders")]
    orders: OrdersConfig,
}

impl ConnectionArgs {
    pub(crate) async fn context(&self) -> Result<AppContext, String> {
        AppContext::from_config(&self.database, &self.pool, &self.orders)
            .await
            .map_err(|error| format!("failed to initialise services: {error}"))
    }
}

/// Print the envelope as JSON on stdout. A failed envelope also fails the command.
pub(crate) fn emit<T: Serialize>(envelope: &Envelope<T>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(envelope)
        .map_err(|error| format!("failed to encode response: {error}"))?;

    println!("{json}");

    if envelope.success {
        Ok(())
    } else {
        Err(format!("command failed: {}", envelope.message))
    }
}

/// Run one service call against a fresh context and print its envelope.
pub(crate) async fn respond<T, F, Fut, E>(
    connection: &ConnectionArgs,
    success_message: &str,
    call: F,
) -> Result<(), String>
where
    T: Serialize,
    F: FnOnce(AppContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Coded + Display,
{
    let context = connection.context().await?;
    let pool = context.pool.clone();

    let envelope = Envelope::respond(call(context).await, success_message);

    pool.shutdown().await;

    emit(&envelope)
}
