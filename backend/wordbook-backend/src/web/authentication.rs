use api_commands::Login;
use axum::{
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::{debug, instrument};
use typed_session_axum::{SessionHandle, WritableSession};

use crate::error::{UserError, WordbookError, WordbookResult};

use super::{
    session::WordbookSessionData, user::password_hash::PasswordHash, WebConfiguration,
    WebDatabaseConnectionPool,
};

/// Rejects requests without a logged-in session with 401.
/// Otherwise, the [`LoggedInUser`] is made available to the handler as request extension.
pub async fn ensure_logged_in<B>(mut request: Request<B>, next: Next<B>) -> Response {
    let Some(session) = request
        .extensions()
        .get::<SessionHandle<WordbookSessionData>>()
        .cloned()
    else {
        return WordbookError::MissingSessionStore.into_response();
    };
    let session_data = *session.read().await.data();

    match require_logged_in(&session_data) {
        Ok(logged_in_user) => {
            request.extensions_mut().insert(logged_in_user);
            next.run(request).await
        }
        Err(error) => error.into_response(),
    }
}

fn require_logged_in(session_data: &WordbookSessionData) -> Result<LoggedInUser, UserError> {
    match session_data {
        WordbookSessionData::Anonymous => Err(UserError::Unauthenticated),
        WordbookSessionData::LoggedIn { user_id } => Ok(LoggedInUser(*user_id)),
    }
}

#[instrument(err, skip_all)]
pub async fn login(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    mut session: WritableSession<WordbookSessionData>,
    Json(login): Json<Login>,
) -> WordbookResult<StatusCode> {
    configuration.verify_username_length(&login.name)?;
    configuration.verify_password_length(&login.password)?;

    let name = &login.name;
    let user = database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::users;
                    use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    let user: Option<(i64, Option<String>)> = users::table
                        .select((users::id, users::password_hash))
                        .filter(users::name.eq(name))
                        .first(database_connection)
                        .await
                        .optional()?;
                    Ok(user)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::Login { source }))?;

    // Users without password hash cannot log in until an administrator sets a password.
    let Some((user_id, Some(password_hash))) = user else {
        *session.data_mut() = WordbookSessionData::Anonymous;
        return Err(UserError::InvalidUsernamePassword.into());
    };

    let mut password_hash = PasswordHash::from(password_hash);
    let verify_result = password_hash.verify(&login.password, &*configuration)?;

    if !verify_result.matches {
        *session.data_mut() = WordbookSessionData::Anonymous;
        return Err(UserError::InvalidUsernamePassword.into());
    }

    if verify_result.modified {
        debug!("Upgrading password hash of user {user_id}");
        let password_hash = String::from(password_hash);
        database_connection_pool
            .execute_transaction_with_retries::<_, WordbookError>(
                move |database_connection| {
                    Box::pin(async move {
                        use crate::database::schema::users;
                        use diesel::{ExpressionMethods, QueryDsl};
                        use diesel_async::RunQueryDsl;

                        diesel::update(users::table.filter(users::id.eq(user_id)))
                            .set(users::password_hash.eq(Some(&password_hash)))
                            .execute(database_connection)
                            .await?;
                        Ok(())
                    })
                },
                configuration.maximum_transaction_retry_count,
            )
            .await
            .map_err(|error| WordbookError::Login {
                source: Box::new(error),
            })?;
    }

    *session.data_mut() = WordbookSessionData::LoggedIn { user_id };

    Ok(StatusCode::NO_CONTENT)
}

pub async fn logout(mut session: WritableSession<WordbookSessionData>) -> StatusCode {
    session.delete();
    StatusCode::NO_CONTENT
}

/// If this extension is found, it means that the request was made by the contained user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedInUser(pub(super) i64);

impl LoggedInUser {
    pub fn user_id(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{require_logged_in, LoggedInUser};
    use crate::{error::UserError, web::session::WordbookSessionData};

    #[test]
    fn test_anonymous_sessions_are_rejected() {
        assert_eq!(
            require_logged_in(&WordbookSessionData::Anonymous),
            Err(UserError::Unauthenticated)
        );
    }

    #[test]
    fn test_logged_in_sessions_carry_the_user() {
        let logged_in_user =
            require_logged_in(&WordbookSessionData::LoggedIn { user_id: 42 }).unwrap();
        assert_eq!(logged_in_user, LoggedInUser(42));
        assert_eq!(logged_in_user.user_id(), 42);
    }
}
