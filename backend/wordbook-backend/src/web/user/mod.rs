use api_commands::CreateAccount;
use axum::{http::StatusCode, Extension, Json};
use tracing::{info, instrument};

use crate::{
    database::transactions::TransactionError,
    error::{UserError, WordbookError, WordbookResult},
};

use self::password_hash::PasswordHash;

use super::{WebConfiguration, WebDatabaseConnectionPool};

pub mod password_hash;

#[instrument(err, skip_all)]
pub async fn create_account(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Json(create_account): Json<CreateAccount>,
) -> WordbookResult<StatusCode> {
    configuration.verify_username_length(&create_account.name)?;
    configuration.verify_password_length(&create_account.password)?;

    let password_hash = String::from(PasswordHash::new(
        &create_account.password,
        &*configuration,
    )?);
    let name = create_account.name;

    let user_id = database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::users;
                    use diesel::ExpressionMethods;
                    use diesel_async::RunQueryDsl;

                    let user_id: i64 = diesel::insert_into(users::table)
                        .values((
                            users::name.eq(&name),
                            users::password_hash.eq(Some(&password_hash)),
                        ))
                        .returning(users::id)
                        .get_result(database_connection)
                        .await
                        .map_err(|error| match error {
                            diesel::result::Error::DatabaseError(
                                diesel::result::DatabaseErrorKind::UniqueViolation,
                                _,
                            ) => TransactionError::from(UserError::UsernameTaken),
                            error => error.into(),
                        })?;

                    Ok(user_id)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::CreateAccount { source }))?;

    info!("Created account with user id {user_id}");
    Ok(StatusCode::CREATED)
}
