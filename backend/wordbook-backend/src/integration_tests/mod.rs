use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, instrument};

use crate::configuration::Configuration;
use crate::database::books::{create_book, delete_book, delete_book_in_transaction, get_book};
use crate::database::words::{create_word, list_words};
use crate::database::{create_async_database_connection_pool, WordbookAsyncDatabaseConnectionPool};
use crate::error::{WordbookError, WordbookResult};

/// Run tests that require a database, but exercise code paths the web API cannot trigger on demand.
#[instrument(err, skip(configuration))]
pub async fn run_internal_integration_tests(configuration: &Configuration) -> WordbookResult<()> {
    let database_connection_pool = create_async_database_connection_pool(configuration).await?;
    let user_id = create_test_user(&database_connection_pool, configuration).await?;

    test_failed_book_deletion_changes_nothing(&database_connection_pool, user_id, configuration)
        .await?;
    test_serialisation_failures_are_retried(&database_connection_pool, user_id, configuration)
        .await?;

    delete_test_user(&database_connection_pool, user_id, configuration).await?;
    info!("Success! All internal integration tests passed");
    Ok(())
}

async fn create_test_user(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<i64> {
    let name = format!(
        "internal-integration-test-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::users;
                    use diesel::ExpressionMethods;
                    use diesel_async::RunQueryDsl;

                    let user_id: i64 = diesel::insert_into(users::table)
                        .values(users::name.eq(&name))
                        .returning(users::id)
                        .get_result(database_connection)
                        .await?;
                    Ok(user_id)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
}

async fn delete_test_user(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<()> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::{books, users, words};
                    use diesel::{ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    diesel::delete(words::table.filter(words::user_id.eq(user_id)))
                        .execute(database_connection)
                        .await?;
                    diesel::delete(books::table.filter(books::user_id.eq(user_id)))
                        .execute(database_connection)
                        .await?;
                    diesel::delete(users::table.filter(users::id.eq(user_id)))
                        .execute(database_connection)
                        .await?;
                    Ok(())
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
}

#[instrument(err, skip(database_connection_pool, configuration))]
async fn test_failed_book_deletion_changes_nothing(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let book_id = create_book(
        database_connection_pool,
        "Aborted deletion".to_string(),
        None,
        user_id,
        configuration,
    )
    .await?;
    for (word, meaning) in [("犬", "dog"), ("猫", "cat"), ("鳥", "bird")] {
        create_word(
            database_connection_pool,
            book_id,
            user_id,
            word.to_string(),
            meaning.to_string(),
            configuration,
        )
        .await?;
    }

    // Delete the words and the book, but fail before committing.
    let result = database_connection_pool
        .execute_transaction_with_retries::<(), WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    let deleted_words =
                        delete_book_in_transaction(database_connection, book_id, user_id).await?;
                    assert_eq!(deleted_words, Some(3));
                    Err(WordbookError::PermanentDatabaseTransactionError {
                        source: "simulated failure after deleting the words".into(),
                    }
                    .into())
                })
            },
            0,
        )
        .await;
    assert!(matches!(
        result,
        Err(WordbookError::PermanentDatabaseTransactionError { .. })
    ));

    assert!(get_book(database_connection_pool, book_id, user_id, configuration)
        .await?
        .is_some());
    assert_eq!(
        list_words(database_connection_pool, book_id, configuration)
            .await?
            .len(),
        3
    );
    info!("Aborted book deletion left book and words untouched");

    assert!(delete_book(database_connection_pool, book_id, user_id, configuration).await?);
    assert!(get_book(database_connection_pool, book_id, user_id, configuration)
        .await?
        .is_none());
    assert!(list_words(database_connection_pool, book_id, configuration)
        .await?
        .is_empty());
    assert!(!delete_book(database_connection_pool, book_id, user_id, configuration).await?);
    info!("Book deletion removed book and words");

    Ok(())
}

/// Two transactions read and increment the same counter concurrently.
/// One of them fails with a serialisation failure, and succeeds when retried.
#[instrument(err, skip(database_connection_pool, configuration))]
async fn test_serialisation_failures_are_retried(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<()> {
    let book_id = create_book(
        database_connection_pool,
        "Concurrent answers".to_string(),
        None,
        user_id,
        configuration,
    )
    .await?;
    let word_id = create_word(
        database_connection_pool,
        book_id,
        user_id,
        "木".to_string(),
        "tree".to_string(),
        configuration,
    )
    .await?;

    let (first, second) = tokio::join!(
        increment_answers(database_connection_pool, word_id, configuration),
        increment_answers(database_connection_pool, word_id, configuration),
    );
    first?;
    second?;

    let words = list_words(database_connection_pool, book_id, configuration).await?;
    assert_eq!(words.len(), 1);
    assert_eq!(words[0].answers, 2);
    info!("Success! Concurrent counter updates were serialised");

    Ok(())
}

/// Read the answers counter, wait, and write it back incremented.
async fn increment_answers(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    word_id: i64,
    configuration: &Configuration,
) -> WordbookResult<()> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::words;
                    use diesel::{ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    let answers: i32 = words::table
                        .filter(words::id.eq(word_id))
                        .select(words::answers)
                        .first(database_connection)
                        .await?;

                    sleep(Duration::from_secs(1)).await;

                    diesel::update(words::table.filter(words::id.eq(word_id)))
                        .set(words::answers.eq(answers + 1))
                        .execute(database_connection)
                        .await?;
                    Ok(())
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
}
