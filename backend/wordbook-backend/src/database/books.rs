use tracing::{debug, instrument};

use crate::{
    configuration::Configuration,
    error::{UserError, WordbookError, WordbookResult},
};

use super::{
    model::{BookChangeset, BookRow, NewBook},
    transactions::TransactionError,
    WordbookAsyncDatabaseConnectionPool,
};

/// List all books of the given user, newest first.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn list_books(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<Vec<BookRow>> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::books;
                    use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
                    use diesel_async::RunQueryDsl;

                    let books: Vec<BookRow> = books::table
                        .filter(books::user_id.eq(user_id))
                        .order((books::created_at.desc(), books::id.desc()))
                        .select(BookRow::as_select())
                        .load(database_connection)
                        .await?;
                    Ok(books)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::ListBooks { source }))
}

/// Get a single book of the given user, or `None` if the user owns no such book.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn get_book(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    book_id: i64,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<Option<BookRow>> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::books;
                    use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
                    use diesel_async::RunQueryDsl;

                    let book: Option<BookRow> = books::table
                        .filter(books::id.eq(book_id))
                        .filter(books::user_id.eq(user_id))
                        .select(BookRow::as_select())
                        .first(database_connection)
                        .await
                        .optional()?;
                    Ok(book)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::GetBook { book_id, source }))
}

/// Create a new book owned by the given user and return its id.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn create_book(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    name: String,
    description: Option<String>,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<i64> {
    if name.trim().is_empty() {
        return Err(UserError::EmptyField { name: "name" }.into());
    }

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::books;
                    use diesel_async::RunQueryDsl;

                    let book_id: i64 = diesel::insert_into(books::table)
                        .values(NewBook {
                            name: &name,
                            description: description.as_deref(),
                            user_id,
                            is_public: false,
                        })
                        .returning(books::id)
                        .get_result(database_connection)
                        .await?;
                    Ok(book_id)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| error.wrap_internal(|source| WordbookError::CreateBook { source }))
}

/// Update name and/or description of a book of the given user and return the updated book.
/// Returns `None` if the user owns no such book.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn update_book(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    book_id: i64,
    name: Option<String>,
    description: Option<String>,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<Option<BookRow>> {
    if name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(UserError::EmptyField { name: "name" }.into());
    }

    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    use crate::database::schema::books;
                    use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
                    use diesel_async::RunQueryDsl;

                    let changeset = BookChangeset {
                        name: name.as_deref(),
                        description: description.as_deref(),
                    };

                    // diesel refuses empty updates
                    let book: Option<BookRow> = if changeset.is_empty() {
                        books::table
                            .filter(books::id.eq(book_id))
                            .filter(books::user_id.eq(user_id))
                            .select(BookRow::as_select())
                            .first(database_connection)
                            .await
                            .optional()?
                    } else {
                        diesel::update(books::table)
                            .filter(books::id.eq(book_id))
                            .filter(books::user_id.eq(user_id))
                            .set(&changeset)
                            .returning(BookRow::as_returning())
                            .get_result(database_connection)
                            .await
                            .optional()?
                    };

                    Ok(book)
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map_err(|error| {
            error.wrap_internal(|source| WordbookError::UpdateBook { book_id, source })
        })
}

/// Delete a book of the given user together with all its words.
/// Either both the words and the book are deleted, or nothing is.
/// Returns `false` if the user owns no such book.
#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn delete_book(
    database_connection_pool: &WordbookAsyncDatabaseConnectionPool,
    book_id: i64,
    user_id: i64,
    configuration: &Configuration,
) -> WordbookResult<bool> {
    database_connection_pool
        .execute_transaction_with_retries::<_, WordbookError>(
            move |database_connection| {
                Box::pin(async move {
                    delete_book_in_transaction(database_connection, book_id, user_id).await
                })
            },
            configuration.maximum_transaction_retry_count,
        )
        .await
        .map(|deleted_words| {
            if let Some(deleted_words) = deleted_words {
                debug!("Deleted book {book_id} with {deleted_words} words");
                true
            } else {
                false
            }
        })
        .map_err(|error| {
            error.wrap_internal(|source| WordbookError::DeleteBook { book_id, source })
        })
}

/// Returns the number of deleted words, or `None` if the user owns no such book.
pub(crate) async fn delete_book_in_transaction(
    database_connection: &mut diesel_async::AsyncPgConnection,
    book_id: i64,
    user_id: i64,
) -> Result<Option<usize>, TransactionError> {
    use crate::database::schema::{books, words};
    use diesel::{ExpressionMethods, OptionalExtension, QueryDsl};
    use diesel_async::RunQueryDsl;

    let owned_book_id: Option<i64> = books::table
        .filter(books::id.eq(book_id))
        .filter(books::user_id.eq(user_id))
        .select(books::id)
        .first(database_connection)
        .await
        .optional()?;
    if owned_book_id.is_none() {
        return Ok(None);
    }

    let deleted_words = diesel::delete(words::table.filter(words::book_id.eq(book_id)))
        .execute(database_connection)
        .await?;

    let deleted_books = diesel::delete(books::table.filter(books::id.eq(book_id)))
        .execute(database_connection)
        .await?;
    if deleted_books != 1 {
        unreachable!("Deleted exactly one existing book, but {deleted_books} were affected");
    }

    Ok(Some(deleted_words))
}
