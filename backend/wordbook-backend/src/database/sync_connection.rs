use diesel::PgConnection;
use tracing::instrument;

use crate::{
    configuration::Configuration,
    error::{WordbookError, WordbookResult},
};

/// Create a synchronous database connection.
/// Only needed for migrations, everything else uses the asynchronous connection pool.
#[instrument(err, skip(configuration))]
pub(super) fn create_sync_connection(configuration: &Configuration) -> WordbookResult<PgConnection> {
    use diesel::Connection;

    PgConnection::establish(configuration.postgres_url.unsecure()).map_err(|error| {
        WordbookError::DatabaseConnection {
            source: Box::new(error),
        }
    })
}
