use std::{error::Error, ffi::OsString};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type WordbookResult<T> = Result<T, WordbookError>;

pub type BoxDynError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum WordbookError {
    #[error("environment variable '{key}' has malformed value {value:?}")]
    MalformedEnvironmentVariable {
        key: String,
        value: OsString,
        #[source]
        source: BoxDynError,
    },

    #[error("invalid configuration: {description}")]
    InvalidConfiguration { description: String },

    #[error("error while setting up tracing")]
    SetupTracing {
        #[source]
        source: BoxDynError,
    },

    #[error("error connecting to the database")]
    DatabaseConnection {
        #[source]
        source: BoxDynError,
    },

    #[error("error creating the database connection pool")]
    DatabaseConnectionPool {
        #[source]
        source: BoxDynError,
    },

    #[error("error while executing database migrations")]
    DatabaseMigration {
        #[source]
        source: BoxDynError,
    },

    #[error("a database transaction failed with temporary errors more than {limit} times")]
    DatabaseTransactionRetryLimitReached { limit: u64 },

    #[error("permanent database transaction error")]
    PermanentDatabaseTransactionError {
        #[source]
        source: BoxDynError,
    },

    #[error("error in the API server")]
    ApiServerError {
        #[source]
        source: BoxDynError,
    },

    #[error("error joining a tokio task")]
    TokioTaskJoin {
        #[source]
        source: BoxDynError,
    },

    #[error("error accessing the job queue")]
    AccessJobQueue {
        #[source]
        source: BoxDynError,
    },

    #[error("error expiring all sessions")]
    ExpireAllSessions {
        #[source]
        source: BoxDynError,
    },

    #[error("error reading the password from stdin")]
    ReadPasswordFromStdin {
        #[source]
        source: BoxDynError,
    },

    #[error("error setting the password of user {username:?}")]
    SetPassword {
        username: String,
        #[source]
        source: BoxDynError,
    },

    #[error("the argon2id parameters are invalid")]
    PasswordArgon2IdParameters {
        #[source]
        source: BoxDynError,
    },

    #[error("error hashing a password with argon2id")]
    PasswordArgon2IdHash {
        #[source]
        source: BoxDynError,
    },

    #[error("error verifying a password with argon2id")]
    PasswordArgon2IdVerify {
        #[source]
        source: BoxDynError,
    },

    #[error("error checking if a password needs to be rehashed")]
    PasswordArgon2IdRehash {
        #[source]
        source: BoxDynError,
    },

    #[error("error inserting a session")]
    InsertSession {
        #[source]
        source: BoxDynError,
    },

    #[error("error reading a session")]
    ReadSession {
        #[source]
        source: BoxDynError,
    },

    #[error("error updating a session")]
    UpdateSession {
        #[source]
        source: BoxDynError,
    },

    #[error("error deleting a session")]
    DeleteSession {
        #[source]
        source: BoxDynError,
    },

    #[error("the session store is missing from the request")]
    MissingSessionStore,

    #[error("error in the session layer")]
    SessionLayer {
        #[source]
        source: BoxDynError,
    },

    #[error("error creating an account")]
    CreateAccount {
        #[source]
        source: BoxDynError,
    },

    #[error("error logging in")]
    Login {
        #[source]
        source: BoxDynError,
    },

    #[error("error listing books")]
    ListBooks {
        #[source]
        source: BoxDynError,
    },

    #[error("error reading book {book_id}")]
    GetBook {
        book_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("error creating a book")]
    CreateBook {
        #[source]
        source: BoxDynError,
    },

    #[error("error updating book {book_id}")]
    UpdateBook {
        book_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("error deleting book {book_id}")]
    DeleteBook {
        book_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("error listing the words of book {book_id}")]
    ListWords {
        book_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("error creating a word")]
    CreateWord {
        #[source]
        source: BoxDynError,
    },

    #[error("error updating word {word_id}")]
    UpdateWord {
        word_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("error deleting word {word_id}")]
    DeleteWord {
        word_id: i64,
        #[source]
        source: BoxDynError,
    },

    #[error("user error: {0}")]
    UserError(#[from] UserError),
}

impl WordbookError {
    /// Wrap an internal error into a more specific one.
    /// User errors pass through unchanged, such that they keep their status code.
    pub fn wrap_internal(self, wrap: impl FnOnce(BoxDynError) -> WordbookError) -> WordbookError {
        match self {
            WordbookError::UserError(user_error) => WordbookError::UserError(user_error),
            error => wrap(Box::new(error)),
        }
    }
}

/// Errors caused by the request, as opposed to errors of the server.
/// Their messages are sent to the client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserError {
    #[error("Bad request. {name} parameter cannot be an array.")]
    ArrayParameter { name: &'static str },

    #[error("Bad request. {name} parameter is required.")]
    MissingParameter { name: &'static str },

    #[error("Bad request. {name} parameter is malformed.")]
    MalformedParameter { name: &'static str },

    #[error("Bad request. {name} cannot be empty.")]
    EmptyField { name: &'static str },

    #[error("Bad request. Malformed body: {reason}")]
    MalformedBody { reason: String },

    #[error("Bad request. correct ({correct}) must be between 0 and answers ({answers}).")]
    CounterInvariant { answers: i32, correct: i32 },

    #[error("Book {book_id} not found.")]
    BookNotFound { book_id: i64 },

    #[error("Word {word_id} not found.")]
    WordNotFound { word_id: i64 },

    #[error("")]
    Unauthenticated,

    #[error("Invalid username or password.")]
    InvalidUsernamePassword,

    #[error("Username is already taken.")]
    UsernameTaken,

    #[error("Username must have between {minimum} and {maximum} characters, but has {actual}.")]
    UsernameLength {
        actual: usize,
        minimum: usize,
        maximum: usize,
    },

    #[error("Password must have between {minimum} and {maximum} characters, but has {actual}.")]
    PasswordLength {
        actual: usize,
        minimum: usize,
        maximum: usize,
    },
}

impl UserError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UserError::ArrayParameter { .. }
            | UserError::MissingParameter { .. }
            | UserError::MalformedParameter { .. }
            | UserError::EmptyField { .. }
            | UserError::MalformedBody { .. }
            | UserError::CounterInvariant { .. }
            | UserError::UsernameLength { .. }
            | UserError::PasswordLength { .. } => StatusCode::BAD_REQUEST,
            UserError::BookNotFound { .. } | UserError::WordNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            UserError::Unauthenticated | UserError::InvalidUsernamePassword => {
                StatusCode::UNAUTHORIZED
            }
            UserError::UsernameTaken => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        match self {
            UserError::Unauthenticated => status_code.into_response(),
            user_error => (status_code, user_error.to_string()).into_response(),
        }
    }
}

impl IntoResponse for WordbookError {
    fn into_response(self) -> Response {
        match self {
            WordbookError::UserError(user_error) => user_error.into_response(),
            error => {
                // The client only learns that something went wrong, the details go to the log.
                error!("Internal error while handling a request: {:?}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::{UserError, WordbookError};

    #[test]
    fn test_array_parameter_message() {
        assert_eq!(
            UserError::ArrayParameter { name: "siteId" }.to_string(),
            "Bad request. siteId parameter cannot be an array."
        );
    }

    #[test]
    fn test_user_error_status_codes() {
        assert_eq!(
            UserError::ArrayParameter { name: "wordId" }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UserError::CounterInvariant {
                answers: 1,
                correct: 2
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            UserError::BookNotFound { book_id: 4 }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            UserError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(UserError::UsernameTaken.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_internal_errors_become_500() {
        let error = WordbookError::ListBooks {
            source: "connection reset by peer".into(),
        };
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_wrap_internal_keeps_user_errors() {
        let error = WordbookError::from(UserError::BookNotFound { book_id: 2 })
            .wrap_internal(|source| WordbookError::DeleteBook { book_id: 2, source });
        assert!(matches!(
            error,
            WordbookError::UserError(UserError::BookNotFound { book_id: 2 })
        ));

        let error = WordbookError::DatabaseTransactionRetryLimitReached { limit: 10 }
            .wrap_internal(|source| WordbookError::DeleteBook { book_id: 2, source });
        assert!(matches!(error, WordbookError::DeleteBook { book_id: 2, .. }));
    }

    #[test]
    fn test_wrapped_user_error_keeps_its_status() {
        let error = WordbookError::from(UserError::WordNotFound { word_id: 9 });
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }
}
