use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::Insertable;
use thiserror::Error;
use typed_session::{Session, SessionExpiry, SessionId, WriteSessionResult};
use typed_session_axum::typed_session::SessionStoreConnector;

use crate::{
    configuration::Configuration,
    database::{
        transactions::{PermanentTransactionError, TransactionError},
        WordbookAsyncDatabaseConnectionPool,
    },
    error::{BoxDynError, WordbookError},
};

#[derive(Clone)]
pub struct WordbookSessionStoreConnector {
    database_connection_pool: WordbookAsyncDatabaseConnectionPool,
    maximum_retries_on_id_collision: u32,
    maximum_transaction_retry_count: u64,
    session_expiry: Duration,
}

/// The data attached to a session cookie.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordbookSessionData {
    #[default]
    Anonymous,
    LoggedIn {
        user_id: i64,
    },
}

impl WordbookSessionStoreConnector {
    pub fn new(
        database_connection_pool: WordbookAsyncDatabaseConnectionPool,
        configuration: &Configuration,
    ) -> Self {
        Self {
            database_connection_pool,
            maximum_retries_on_id_collision: configuration
                .maximum_session_id_generation_retry_count,
            maximum_transaction_retry_count: configuration.maximum_transaction_retry_count,
            session_expiry: configuration.session_expiry,
        }
    }

    /// Sessions without an expiry still expire after the configured session lifetime.
    fn database_expiry(&self, session_expiry: &SessionExpiry) -> DateTime<Utc> {
        bounded_expiry(session_expiry, Utc::now(), self.session_expiry)
    }
}

fn bounded_expiry(
    session_expiry: &SessionExpiry,
    now: DateTime<Utc>,
    maximum_lifetime: Duration,
) -> DateTime<Utc> {
    let maximum_expiry = now + maximum_lifetime;
    match session_expiry {
        SessionExpiry::DateTime(expiry) => (*expiry).min(maximum_expiry),
        SessionExpiry::Never => maximum_expiry,
    }
}

#[async_trait]
impl SessionStoreConnector<WordbookSessionData> for WordbookSessionStoreConnector {
    type Error = WordbookError;

    fn maximum_retries_on_id_collision(&self) -> Option<u32> {
        Some(self.maximum_retries_on_id_collision)
    }

    async fn create_session(
        &mut self,
        current_id: &SessionId,
        session_expiry: &SessionExpiry,
        data: &WordbookSessionData,
    ) -> Result<WriteSessionResult, typed_session::Error<Self::Error>> {
        let insertable =
            WordbookSessionInsertable::new(current_id, self.database_expiry(session_expiry), data);

        match self
            .database_connection_pool
            .execute_transaction_with_retries::<_, TryWriteSessionError>(
                |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::sessions::dsl::*;
                        use diesel_async::RunQueryDsl;

                        insertable
                            .insert_into(sessions)
                            .execute(database_connection)
                            .await
                            .map_err(|error| match error {
                                diesel::result::Error::DatabaseError(
                                    diesel::result::DatabaseErrorKind::UniqueViolation,
                                    database_error_information,
                                ) if database_error_information.table_name()
                                    == Some("sessions") =>
                                {
                                    TransactionError::Permanent(
                                        TryWriteSessionError::SessionIdExists,
                                    )
                                }
                                error => TransactionError::Diesel(error),
                            })?;

                        Ok(())
                    })
                },
                self.maximum_transaction_retry_count,
            )
            .await
        {
            Ok(()) => Ok(WriteSessionResult::Ok(())),
            Err(TryWriteSessionError::SessionIdExists) => Ok(WriteSessionResult::SessionIdExists),
            Err(TryWriteSessionError::Permanent(source)) => {
                Err(WordbookError::InsertSession { source })
            }
            Err(TryWriteSessionError::TooManyTemporaryErrors(limit)) => {
                Err(WordbookError::DatabaseTransactionRetryLimitReached { limit })
            }
        }
        .map_err(typed_session::Error::SessionStoreConnector)
    }

    async fn read_session(
        &mut self,
        id: SessionId,
    ) -> Result<Option<Session<WordbookSessionData>>, typed_session::Error<Self::Error>> {
        let session_id: Vec<u8> = AsRef::<[u8]>::as_ref(&id).to_vec();

        let session_row = self
            .database_connection_pool
            .execute_transaction_with_retries::<_, WordbookError>(
                move |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::sessions;
                        use diesel::{dsl::now, ExpressionMethods, OptionalExtension, QueryDsl};
                        use diesel_async::RunQueryDsl;

                        let session_row: Option<(DateTime<Utc>, Option<i64>)> = sessions::table
                            .filter(sessions::id.eq(session_id.as_slice()))
                            .filter(sessions::expiry.gt(now))
                            .select((sessions::expiry, sessions::user_id))
                            .first(database_connection)
                            .await
                            .optional()?;
                        Ok(session_row)
                    })
                },
                self.maximum_transaction_retry_count,
            )
            .await
            .map_err(|error| WordbookError::ReadSession {
                source: Box::new(error),
            })
            .map_err(typed_session::Error::SessionStoreConnector)?;

        Ok(session_row.map(|(expiry, user_id)| {
            let data = match user_id {
                Some(user_id) => WordbookSessionData::LoggedIn { user_id },
                None => WordbookSessionData::Anonymous,
            };
            Session::new_from_session_store(id, SessionExpiry::DateTime(expiry), data)
        }))
    }

    async fn update_session(
        &mut self,
        current_id: &SessionId,
        previous_id: &SessionId,
        session_expiry: &SessionExpiry,
        data: &WordbookSessionData,
    ) -> Result<WriteSessionResult, typed_session::Error<Self::Error>> {
        let insertable =
            WordbookSessionInsertable::new(current_id, self.database_expiry(session_expiry), data);
        let previous_id: &[u8] = previous_id.as_ref();

        match self
            .database_connection_pool
            .execute_transaction_with_retries::<_, TryWriteSessionError>(
                |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::sessions;
                        use diesel::{ExpressionMethods, QueryDsl};
                        use diesel_async::RunQueryDsl;

                        // The id changes on every update, so we replace the whole row.
                        diesel::delete(sessions::table.filter(sessions::id.eq(previous_id)))
                            .execute(database_connection)
                            .await
                            .map_err(TransactionError::Diesel)?;

                        insertable
                            .insert_into(sessions::table)
                            .execute(database_connection)
                            .await
                            .map_err(|error| match error {
                                diesel::result::Error::DatabaseError(
                                    diesel::result::DatabaseErrorKind::UniqueViolation,
                                    database_error_information,
                                ) if database_error_information.table_name()
                                    == Some("sessions") =>
                                {
                                    TransactionError::Permanent(
                                        TryWriteSessionError::SessionIdExists,
                                    )
                                }
                                error => TransactionError::Diesel(error),
                            })?;

                        Ok(())
                    })
                },
                self.maximum_transaction_retry_count,
            )
            .await
        {
            Ok(()) => Ok(WriteSessionResult::Ok(())),
            Err(TryWriteSessionError::SessionIdExists) => Ok(WriteSessionResult::SessionIdExists),
            Err(TryWriteSessionError::Permanent(source)) => {
                Err(WordbookError::UpdateSession { source })
            }
            Err(TryWriteSessionError::TooManyTemporaryErrors(limit)) => {
                Err(WordbookError::DatabaseTransactionRetryLimitReached { limit })
            }
        }
        .map_err(typed_session::Error::SessionStoreConnector)
    }

    async fn delete_session(
        &mut self,
        id: &SessionId,
    ) -> Result<(), typed_session::Error<Self::Error>> {
        let session_id: &[u8] = id.as_ref();

        self.database_connection_pool
            .execute_transaction_with_retries::<_, WordbookError>(
                move |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::sessions;
                        use diesel::{ExpressionMethods, QueryDsl};
                        use diesel_async::RunQueryDsl;

                        diesel::delete(sessions::table.filter(sessions::id.eq(session_id)))
                            .execute(database_connection)
                            .await?;
                        Ok(())
                    })
                },
                self.maximum_transaction_retry_count,
            )
            .await
            .map_err(|error| WordbookError::DeleteSession {
                source: Box::new(error),
            })
            .map_err(typed_session::Error::SessionStoreConnector)
    }

    async fn clear(&mut self) -> Result<(), typed_session::Error<Self::Error>> {
        self.database_connection_pool
            .execute_read_committed_transaction::<_, WordbookError>(
                |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::sessions;
                        use diesel_async::RunQueryDsl;

                        diesel::delete(sessions::table)
                            .execute(database_connection)
                            .await?;
                        Ok(())
                    })
                },
                self.maximum_transaction_retry_count,
            )
            .await
            .map_err(|error| WordbookError::ExpireAllSessions {
                source: Box::new(error),
            })
            .map_err(typed_session::Error::SessionStoreConnector)
    }
}

#[derive(Insertable, Debug, Clone, Copy)]
#[diesel(table_name = crate::database::schema::sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct WordbookSessionInsertable<'a> {
    id: &'a [u8],
    expiry: DateTime<Utc>,
    user_id: Option<i64>,
}

impl<'a> WordbookSessionInsertable<'a> {
    fn new(id: &'a SessionId, expiry: DateTime<Utc>, data: &WordbookSessionData) -> Self {
        Self {
            id: id.as_ref(),
            expiry,
            user_id: match data {
                WordbookSessionData::Anonymous => None,
                WordbookSessionData::LoggedIn { user_id } => Some(*user_id),
            },
        }
    }
}

#[derive(Debug, Error)]
enum TryWriteSessionError {
    #[error("permanent transaction error: {0}")]
    Permanent(BoxDynError),
    #[error("too many temporary transaction errors: {0}")]
    TooManyTemporaryErrors(u64),
    #[error("session id exists")]
    SessionIdExists,
}

impl PermanentTransactionError for TryWriteSessionError {
    fn too_many_temporary_errors(limit: u64) -> Self {
        Self::TooManyTemporaryErrors(limit)
    }

    fn permanent_error(source: BoxDynError) -> Self {
        Self::Permanent(source)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use typed_session::SessionExpiry;

    use super::bounded_expiry;

    #[test]
    fn test_sessions_without_expiry_expire_after_the_maximum_lifetime() {
        let now = Utc.with_ymd_and_hms(2023, 11, 18, 12, 0, 0).unwrap();
        assert_eq!(
            bounded_expiry(&SessionExpiry::Never, now, Duration::hours(720)),
            now + Duration::hours(720)
        );
    }

    #[test]
    fn test_earlier_expiry_is_kept() {
        let now = Utc.with_ymd_and_hms(2023, 11, 18, 12, 0, 0).unwrap();
        let expiry = now + Duration::hours(1);
        assert_eq!(
            bounded_expiry(
                &SessionExpiry::DateTime(expiry),
                now,
                Duration::hours(720)
            ),
            expiry
        );
        assert_eq!(
            bounded_expiry(
                &SessionExpiry::DateTime(now + Duration::hours(1000)),
                now,
                Duration::hours(720)
            ),
            now + Duration::hours(720)
        );
    }
}
