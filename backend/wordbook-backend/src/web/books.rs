use api_commands::{Book, CreateBook, CreateBookResponse, UpdateBook};
use axum::{
    extract::{rejection::JsonRejection, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Extension, Json,
};

use crate::{
    database::books,
    error::{UserError, WordbookResult},
};

use super::{
    authentication::LoggedInUser,
    method_not_allowed,
    parameters::{id_query_parameter, json_body, required_id_query_parameter, QueryParameters},
    WebConfiguration, WebDatabaseConnectionPool,
};

/// Clients of the book API expect this name in array parameter errors.
const BOOK_ID_ARRAY_NAME: &str = "siteId";

pub fn book_routes() -> MethodRouter {
    get(get_books)
        .post(create_book)
        .put(update_book)
        .delete(delete_book)
        .fallback(method_not_allowed)
}

/// Without `bookId`, list all books of the user.
/// With `bookId`, return that book, or `null` if the user owns no such book.
async fn get_books(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Extension(logged_in_user): Extension<LoggedInUser>,
    Query(parameters): Query<QueryParameters>,
) -> WordbookResult<Response> {
    let book_id = id_query_parameter(&parameters, "bookId", BOOK_ID_ARRAY_NAME)?;

    if let Some(book_id) = book_id {
        let book = books::get_book(
            &database_connection_pool,
            book_id,
            logged_in_user.user_id(),
            &configuration,
        )
        .await?;
        Ok(Json(book.map(Book::from)).into_response())
    } else {
        let books = books::list_books(
            &database_connection_pool,
            logged_in_user.user_id(),
            &configuration,
        )
        .await?;
        Ok(Json(books.into_iter().map(Book::from).collect::<Vec<_>>()).into_response())
    }
}

async fn create_book(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Extension(logged_in_user): Extension<LoggedInUser>,
    body: Result<Json<CreateBook>, JsonRejection>,
) -> WordbookResult<(StatusCode, Json<CreateBookResponse>)> {
    let create_book = json_body(body)?;

    let book_id = books::create_book(
        &database_connection_pool,
        create_book.name,
        create_book.description,
        logged_in_user.user_id(),
        &configuration,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(CreateBookResponse { book_id })))
}

async fn update_book(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Extension(logged_in_user): Extension<LoggedInUser>,
    body: Result<Json<UpdateBook>, JsonRejection>,
) -> WordbookResult<Json<Book>> {
    let update_book = json_body(body)?;
    let book_id = update_book.id;

    books::update_book(
        &database_connection_pool,
        book_id,
        update_book.name,
        update_book.description,
        logged_in_user.user_id(),
        &configuration,
    )
    .await?
    .map(|book| Json(book.into()))
    .ok_or_else(|| UserError::BookNotFound { book_id }.into())
}

async fn delete_book(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Extension(logged_in_user): Extension<LoggedInUser>,
    Query(parameters): Query<QueryParameters>,
) -> WordbookResult<StatusCode> {
    let book_id = required_id_query_parameter(&parameters, "bookId", BOOK_ID_ARRAY_NAME)?;

    if books::delete_book(
        &database_connection_pool,
        book_id,
        logged_in_user.user_id(),
        &configuration,
    )
    .await?
    {
        Ok(StatusCode::OK)
    } else {
        Err(UserError::BookNotFound { book_id }.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header::ALLOW, Request, StatusCode},
        Extension, Router,
    };
    use tower::ServiceExt;

    use super::book_routes;
    use crate::{
        configuration::Configuration, database::create_async_database_connection_pool,
        web::authentication::LoggedInUser,
    };

    async fn router() -> Router {
        let configuration = Configuration::test_configuration();
        // connections are established lazily, and none of the tested requests reach the database
        let database_connection_pool = create_async_database_connection_pool(&configuration)
            .await
            .unwrap();

        Router::new()
            .route("/api/book", book_routes())
            .layer(Extension(LoggedInUser(1)))
            .layer(Extension(database_connection_pool))
            .layer(Extension(Arc::new(configuration)))
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_array_book_id_is_rejected() {
        let response = router()
            .await
            .oneshot(
                Request::get("/api/book?bookId=x1,x2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response).await,
            "Bad request. siteId parameter cannot be an array."
        );
    }

    #[tokio::test]
    async fn test_repeated_book_id_on_delete_is_rejected() {
        let response = router()
            .await
            .oneshot(
                Request::delete("/api/book?bookId=1&bookId=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response).await,
            "Bad request. siteId parameter cannot be an array."
        );
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let response = router()
            .await
            .oneshot(
                Request::patch("/api/book")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST, DELETE, PUT");
        assert_eq!(body_text(response).await, "Method PATCH Not Allowed");
    }

    #[tokio::test]
    async fn test_create_book_without_name_is_a_bad_request() {
        let response = router()
            .await
            .oneshot(
                Request::post("/api/book")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"description": "no name"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_book_with_empty_name_is_a_bad_request() {
        let response = router()
            .await
            .oneshot(
                Request::post("/api/book")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "Bad request. name cannot be empty.");
    }
}
