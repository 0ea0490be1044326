use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    scoped_futures::ScopedBoxFuture,
    AsyncPgConnection,
};
use tracing::{debug, instrument};

use crate::{
    configuration::Configuration,
    error::{WordbookError, WordbookResult},
};

use self::transactions::{is_temporary_database_error, PermanentTransactionError, TransactionError};

pub mod books;
pub mod migrations;
pub mod model;
pub mod schema;
mod sync_connection;
pub mod transactions;
pub mod words;

#[derive(Clone)]
pub struct WordbookAsyncDatabaseConnectionPool {
    implementation: Pool<AsyncPgConnection>,
}

#[derive(Debug, Clone, Copy)]
enum IsolationLevel {
    Serializable,
    ReadCommitted,
}

/// Create a pool of asynchronous database connections.
/// Connections are established lazily, so this does not fail if the database is unreachable.
#[instrument(err, skip(configuration))]
pub async fn create_async_database_connection_pool(
    configuration: &Configuration,
) -> WordbookResult<WordbookAsyncDatabaseConnectionPool> {
    let connection_manager =
        AsyncDieselConnectionManager::<AsyncPgConnection>::new(configuration.postgres_url.unsecure());
    let pool = Pool::builder(connection_manager)
        .build()
        .map_err(|error| WordbookError::DatabaseConnectionPool {
            source: Box::new(error),
        })?;

    Ok(WordbookAsyncDatabaseConnectionPool {
        implementation: pool,
    })
}

impl WordbookAsyncDatabaseConnectionPool {
    /// Execute a serializable database transaction and retry on failure.
    /// Temporary failures are logged and the transaction is retried (by calling a clone of the closure again).
    /// Permanent failures cause the function to return immediately.
    ///
    /// If `max_retries` temporary errors have occurred, then [`PermanentTransactionError::too_many_temporary_errors`] is returned.
    pub async fn execute_transaction_with_retries<'b, ReturnType, PermanentErrorType>(
        &self,
        transaction: impl for<'r> FnOnce(
                &'r mut AsyncPgConnection,
            ) -> ScopedBoxFuture<
                'b,
                'r,
                Result<ReturnType, TransactionError<PermanentErrorType>>,
            > + Clone
            + Send
            + 'b,
        max_retries: u64,
    ) -> Result<ReturnType, PermanentErrorType>
    where
        ReturnType: Send + 'b,
        PermanentErrorType: PermanentTransactionError + Send + 'b,
    {
        self.execute_transaction_with_isolation_level(
            transaction,
            max_retries,
            IsolationLevel::Serializable,
        )
        .await
    }

    /// Like [`Self::execute_transaction_with_retries`], but with isolation level "read committed".
    /// Use this for transactions that touch many rows and whose effect does not depend on concurrent writes.
    pub async fn execute_read_committed_transaction<'b, ReturnType, PermanentErrorType>(
        &self,
        transaction: impl for<'r> FnOnce(
                &'r mut AsyncPgConnection,
            ) -> ScopedBoxFuture<
                'b,
                'r,
                Result<ReturnType, TransactionError<PermanentErrorType>>,
            > + Clone
            + Send
            + 'b,
        max_retries: u64,
    ) -> Result<ReturnType, PermanentErrorType>
    where
        ReturnType: Send + 'b,
        PermanentErrorType: PermanentTransactionError + Send + 'b,
    {
        self.execute_transaction_with_isolation_level(
            transaction,
            max_retries,
            IsolationLevel::ReadCommitted,
        )
        .await
    }

    async fn execute_transaction_with_isolation_level<'b, ReturnType, PermanentErrorType>(
        &self,
        transaction: impl for<'r> FnOnce(
                &'r mut AsyncPgConnection,
            ) -> ScopedBoxFuture<
                'b,
                'r,
                Result<ReturnType, TransactionError<PermanentErrorType>>,
            > + Clone
            + Send
            + 'b,
        max_retries: u64,
        isolation_level: IsolationLevel,
    ) -> Result<ReturnType, PermanentErrorType>
    where
        ReturnType: Send + 'b,
        PermanentErrorType: PermanentTransactionError + Send + 'b,
    {
        let mut database_connection = self
            .implementation
            .get()
            .await
            .map_err(|error| PermanentErrorType::permanent_error(Box::new(error)))?;

        for _ in 0..max_retries.saturating_add(1) {
            let attempt = transaction.clone();
            let result = match isolation_level {
                IsolationLevel::Serializable => {
                    database_connection
                        .build_transaction()
                        .serializable()
                        .run(attempt)
                        .await
                }
                IsolationLevel::ReadCommitted => {
                    database_connection
                        .build_transaction()
                        .read_committed()
                        .run(attempt)
                        .await
                }
            };

            match result {
                Ok(result) => return Ok(result),
                Err(TransactionError::Temporary(error)) => {
                    debug!("temporary transaction error: {error}")
                }
                Err(TransactionError::Diesel(error)) if is_temporary_database_error(&error) => {
                    debug!("temporary database error: {error}")
                }
                Err(TransactionError::Diesel(error)) => {
                    return Err(PermanentErrorType::permanent_error(Box::new(error)))
                }
                Err(TransactionError::Permanent(error)) => return Err(error),
            }
        }

        Err(PermanentErrorType::too_many_temporary_errors(max_retries))
    }
}
