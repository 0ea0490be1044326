use tracing::instrument;

use crate::{
    configuration::Configuration,
    error::{UserError, WordbookError, WordbookResult},
};

use super::{
    model::{NewWord, WordChangeset, WordRow},
    transactions::TransactionError,
    WordbookAsyncDatabaseConnectionPool,
};

/// Changes to a word. `None` fields are left untouched.
/// Counters are absolute values, not increments.
#[derive(Debug, Clone, Default)]
pub struct WordChanges {
    pub word: Option<String>,
    pub meaning: Option<String>,
    pub answers: Option<i32>,
    pub correct: Option<i32>,
}

/// List the words of a book, newest first.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn list_words(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    book_id: i64,
    configuration: &Configuration,
) -> WordbookResult<Vec<WordRow>> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::words;
                    use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
                    use diesel_async::RunQueryDsl;

                    let words: Vec<WordRow> = words::table
                        .filter(words::book_id.eq(book_id))
                        .order((words::created_at.desc(), words::id.desc()))
                        .select(WordRow::as_select())
                        .load(database_connection)
                        .await?;
                    Ok(words)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::ListWords { book_id, source }))
}

/// Create a new word with zeroed counters and return its id.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn create_word(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    book_id: i64,
    user_id: i64,
    word: String,
    meaning: String,
    configuration: &Configuration,
) -> WordbookResult<i64> {
    if word.trim().is_empty() {
        return Err(UserError::EmptyField { name: "word" }.into());
    }
    if meaning.trim().is_empty() {
        return Err(UserError::EmptyField { name: "meaning" }.into());
    }

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::words;
                    use diesel_async::RunQueryDsl;

                    let word_id: i64 = diesel::insert_into(words::table)
                        .values(NewWord {
                            word: &word,
                            meaning: &meaning,
                            answers: 0,
                            correct: 0,
                            book_id,
                            user_id,
                        })
                        .returning(words::id)
                        .get_result(database_connection)
                        .await
                        .map_err(|error| match error {
                            diesel::result::Error::DatabaseError(
                                diesel::result::DatabaseErrorKind::ForeignKeyViolation,
                                database_error_information,
                            ) if database_error_information.constraint_name()
                                == Some("words_book_id_fkey") =>
                            {
                                TransactionError::from(UserError::BookNotFound { book_id })
                            }
                            error => error.into(),
                        })?;
                    Ok(word_id)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::CreateWord { source }))
}

/// Apply the given changes to a word and return the updated word.
/// Returns `None` if there is no such word.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn update_word(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    word_id: i64,
    changes: WordChanges,
    configuration: &Configuration,
) -> WordbookResult<Option<WordRow>> {
    if changes.word.as_deref().is_some_and(|word| word.trim().is_empty()) {
        return Err(UserError::EmptyField { name: "word" }.into());
    }
    if changes
        .meaning
        .as_deref()
        .is_some_and(|meaning| meaning.trim().is_empty())
    {
        return Err(UserError::EmptyField { name: "meaning" }.into());
    }

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::words;
                    use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
                    use diesel_async::RunQueryDsl;

                    let current: Option<WordRow> = words::table
                        .filter(words::id.eq(word_id))
                        .select(WordRow::as_select())
                        .first(database_connection)
                        .await
                        .optional()?;
                    let Some(current) = current else {
                        return Ok(None);
                    };

                    resulting_counters(&current, changes.answers, changes.correct)?;

                    let changeset = WordChangeset {
                        word: changes.word.as_deref(),
                        meaning: changes.meaning.as_deref(),
                        answers: changes.answers,
                        correct: changes.correct,
                    };
                    // diesel refuses empty updates
                    if changeset.is_empty() {
                        return Ok(Some(current));
                    }

                    let updated: WordRow = diesel::update(words::table)
                        .filter(words::id.eq(word_id))
                        .set(&changeset)
                        .returning(WordRow::as_returning())
                        .get_result(database_connection)
                        .await?;
                    Ok(Some(updated))
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| {
            error.wrap_internal(|source| WordbookError::UpdateWord { word_id, source })
        })
}

/// Delete a word. Returns `false` if there is no such word.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn delete_word(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    word_id: i64,
    configuration: &Configuration,
) -> WordbookResult<bool> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::words;
                    use diesel::{ExpressionMethods, QueryDsl};
                    use diesel_async::RunQueryDsl;

                    let deleted_rows =
                        diesel::delete(words::table.filter(words::id.eq(word_id)))
                            .execute(database_connection)
                            .await?;
                    Ok(deleted_rows == 1)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| {
            error.wrap_internal(|source| WordbookError::DeleteWord { word_id, source })
        })
}

/// Compute the counters a word would have after applying the given absolute counter values.
/// Fails if the result violates `0 <= correct <= answers`.
fn resulting_counters(
    current: &WordRow,
    answers: Option<i32>,
    correct: Option<i32>,
) -> Result<(i32, i32), UserError> {
    let answers = answers.unwrap_or(current.answers);
    let correct = correct.unwrap_or(current.correct);

    if correct < 0 || answers < correct {
        Err(UserError::CounterInvariant { answers, correct })
    } else {
        Ok((answers, correct))
    }
}
