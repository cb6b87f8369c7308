use clap::{Args, Subcommand};
use storefront_app::{
    config::{DatabaseConfig, PoolConfig},
    database,
    response::Envelope,
};

use crate::cli::emit;

#[derive(Debug, Args)]
pub(crate) struct PoolCommand {
    #[command(subcommand)]
    command: PoolSubcommand,
}

#[derive(Debug, Subcommand)]
enum PoolSubcommand {
    /// Open the pool and report its counters
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub(crate) struct StatusArgs {
    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten, next_help_heading = "Pool")]
    pool: PoolConfig,
}

pub(crate) async fn run(command: PoolCommand) -> Result<(), String> {
    match command.command {
        PoolSubcommand::Status(args) => status(args).await,
    }
}

async fn status(args: StatusArgs) -> Result<(), String> {
    let envelope = match database::connect(&args.database.database_url, &args.pool).await {
        Ok(pool) => {
            let status = pool.status();
            pool.shutdown().await;

            Envelope::ok("pool is healthy", status)
        }
        Err(error) => Envelope::respond(Err(error), "pool is healthy"),
    };

    emit(&envelope)
}
