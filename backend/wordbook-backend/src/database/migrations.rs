use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tracing::{info, instrument};

use crate::{
    configuration::Configuration,
    database::sync_connection::create_sync_connection,
    error::{WordbookError, WordbookResult},
};

const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!();

/// Check if the database lacks some of the embedded migrations, and log their names.
///
/// `diesel_migrations` only works with synchronous connections.
#[instrument(err, skip(configuration))]
pub fn has_missing_migrations(configuration: &Configuration) -> WordbookResult<bool> {
    let mut connection = create_sync_connection(configuration)?;

    let pending_migrations = connection
        .pending_migrations(MIGRATIONS)
        .map_err(|source| WordbookError::DatabaseMigration { source })?;
    for migration in &pending_migrations {
        info!("Pending database migration: {}", migration.name());
    }

    Ok(!pending_migrations.is_empty())
}

/// Apply all pending migrations.
/// Must not run concurrently with itself on the same database.
#[instrument(err, skip(configuration))]
pub fn run_migrations(configuration: &Configuration) -> WordbookResult<()> {
    let mut connection = create_sync_connection(configuration)?;

    let applied_migrations = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|source| WordbookError::DatabaseMigration { source })?;
    for migration in applied_migrations {
        info!("Applied database migration {migration}");
    }

    Ok(())
}
