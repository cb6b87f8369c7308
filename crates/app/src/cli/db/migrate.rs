use clap::Args;
use serde::Serialize;
use sqlx::{Connection, PgConnection};
use storefront_app::{
    config::DatabaseConfig,
    database,
    response::{Envelope, ErrorCode},
};
use tracing::{info, warn};

use crate::cli::emit;

#[derive(Debug, Args)]
pub(crate) struct MigrateArgs {
    #[command(flatten)]
    database: DatabaseConfig,
}

#[derive(Debug, Serialize)]
struct MigrationReport {
    schema_verified: bool,
}

pub(crate) async fn run(args: MigrateArgs) -> Result<(), String> {
    // A single session, so the schema can be migrated before any pool exists.
    let mut conn = PgConnection::connect(&args.database.database_url)
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

    let envelope = match apply(&mut conn).await {
        Ok(report) => {
            info!("migrations applied");

            Envelope::ok("migrations applied", report)
        }
        Err(message) => Envelope::error(ErrorCode::DatabaseError, message),
    };

    if let Err(error) = conn.close().await {
        warn!(error = %error, "failed to close migration session");
    }

    emit(&envelope)
}

async fn apply(conn: &mut PgConnection) -> Result<MigrationReport, String> {
    database::migrate(conn)
        .await
        .map_err(|error| format!("failed to apply migrations: {error}"))?;

    database::verify_schema(conn)
        .await
        .map_err(|error| format!("schema check failed after migrating: {error}"))?;

    Ok(MigrationReport {
        schema_verified: true,
    })
}
