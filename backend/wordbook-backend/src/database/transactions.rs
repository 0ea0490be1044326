use diesel::result::DatabaseErrorKind;

use crate::error::{BoxDynError, UserError, WordbookError};

/// The error of a single transaction attempt.
#[derive(Debug)]
pub enum TransactionError<PermanentErrorType = WordbookError> {
    /// The transaction was unable to complete, but should be retried.
    Temporary(BoxDynError),
    /// The transaction was unable to complete and should not be retried.
    Permanent(PermanentErrorType),
    /// A database error.
    /// Serialisation failures are retried, all other database errors are permanent.
    Diesel(diesel::result::Error),
}

impl<PermanentErrorType> From<diesel::result::Error> for TransactionError<PermanentErrorType> {
    fn from(value: diesel::result::Error) -> Self {
        Self::Diesel(value)
    }
}

impl From<WordbookError> for TransactionError<WordbookError> {
    fn from(value: WordbookError) -> Self {
        Self::Permanent(value)
    }
}

impl From<UserError> for TransactionError<WordbookError> {
    fn from(value: UserError) -> Self {
        Self::Permanent(value.into())
    }
}

/// An error type that indicates a permanent transaction failure.
pub trait PermanentTransactionError {
    /// Construct the error instance representing "too many temporary errors".
    /// The `limit` is the error limit that was reached.
    fn too_many_temporary_errors(limit: u64) -> Self;

    /// Construct the error instance representing a general permanent error.
    fn permanent_error(source: BoxDynError) -> Self;
}

impl PermanentTransactionError for WordbookError {
    fn too_many_temporary_errors(limit: u64) -> Self {
        Self::DatabaseTransactionRetryLimitReached { limit }
    }

    fn permanent_error(source: BoxDynError) -> Self {
        Self::PermanentDatabaseTransactionError { source }
    }
}

/// Returns true if the error was caused by a concurrent transaction,
/// such that simply running the transaction again may succeed.
pub(super) fn is_temporary_database_error(error: &diesel::result::Error) -> bool {
    matches!(
        error,
        diesel::result::Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _)
    )
}
