use api_commands::{CreateWord, CreateWordResponse, UpdateWord, Word, WordList};
use axum::{
    extract::{rejection::JsonRejection, Query},
    http::StatusCode,
    routing::{get, MethodRouter},
    Extension, Json,
};

use crate::{
    database::words::{self, WordChanges},
    error::{UserError, WordbookResult},
};

use super::{
    method_not_allowed,
    parameters::{json_body, json_body_without_arrays, required_id_query_parameter, QueryParameters},
    WebConfiguration, WebDatabaseConnectionPool,
};

pub fn word_routes() -> MethodRouter {
    get(get_words)
        .post(create_word)
        .put(update_word)
        .delete(delete_word)
        .fallback(method_not_allowed)
}

async fn get_words(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Query(parameters): Query<QueryParameters>,
) -> WordbookResult<Json<WordList>> {
    let book_id = required_id_query_parameter(&parameters, "bookId", "bookId")?;

    let words = words::list_words(&database_connection_pool, book_id, &configuration).await?;

    Ok(Json(WordList {
        words: words.into_iter().map(Word::from).collect(),
    }))
}

async fn create_word(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> WordbookResult<(StatusCode, Json<CreateWordResponse>)> {
    let create_word: CreateWord =
        json_body_without_arrays(body, &["bookId", "word", "meaning", "userId"])?;

    let word_id = words::create_word(
        &database_connection_pool,
        create_word.book_id,
        create_word.user_id,
        create_word.word,
        create_word.meaning,
        &configuration,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(CreateWordResponse { word_id })))
}

async fn update_word(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    body: Result<Json<UpdateWord>, JsonRejection>,
) -> WordbookResult<Json<Word>> {
    let update_word = json_body(body)?;
    let word_id = update_word.word_id;

    words::update_word(
        &database_connection_pool,
        word_id,
        WordChanges {
            word: update_word.word,
            meaning: update_word.meaning,
            answers: update_word.answers,
            correct: update_word.correct,
        },
        &configuration,
    )
    .await?
    .map(|word| Json(word.into()))
    .ok_or_else(|| UserError::WordNotFound { word_id }.into())
}

async fn delete_word(
    Extension(database_connection_pool): WebDatabaseConnectionPool,
    Extension(configuration): WebConfiguration,
    Query(parameters): Query<QueryParameters>,
) -> WordbookResult<StatusCode> {
    let word_id = required_id_query_parameter(&parameters, "wordId", "wordId")?;

    if words::delete_word(&database_connection_pool, word_id, &configuration).await? {
        Ok(StatusCode::OK)
    } else {
        Err(UserError::WordNotFound { word_id }.into())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Extension, Router,
    };
    use tower::ServiceExt;

    use super::word_routes;
    use crate::{configuration::Configuration, database::create_async_database_connection_pool};

    async fn router() -> Router {
        let configuration = Configuration::test_configuration();
        let database_connection_pool = create_async_database_connection_pool(&configuration)
            .await
            .unwrap();

        Router::new()
            .route("/api/word", word_routes())
            .layer(Extension(database_connection_pool))
            .layer(Extension(Arc::new(configuration)))
    }

    async fn send(request: Request<Body>) -> (StatusCode, String) {
        let response = router().await.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_array_word_id_is_rejected() {
        let (status, body) = send(
            Request::delete("/api/word?wordId=1,2")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad request. wordId parameter cannot be an array.");
    }

    #[tokio::test]
    async fn test_missing_book_id_is_rejected() {
        let (status, body) = send(Request::get("/api/word").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad request. bookId parameter is required.");
    }

    #[tokio::test]
    async fn test_array_field_in_new_word_is_rejected() {
        let (status, body) = send(
            Request::post("/api/word")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"bookId": 1, "word": ["犬", "猫"], "meaning": "dog", "userId": 1}"#,
                ))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad request. word parameter cannot be an array.");
    }

    #[tokio::test]
    async fn test_empty_meaning_is_rejected() {
        let (status, body) = send(
            Request::post("/api/word")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"bookId": 1, "word": "犬", "meaning": "", "userId": 1}"#,
                ))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Bad request. meaning cannot be empty.");
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (status, body) = send(
            Request::options("/api/word")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, "Method OPTIONS Not Allowed");
    }
}
