use std::{convert::Infallible, sync::Arc};

use axum::{
    error_handling::HandleErrorLayer,
    http::{header::ALLOW, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;
use tracing::{debug, error, info, instrument};
use typed_session_axum::{SessionLayer, SessionLayerError};

use crate::{
    configuration::Configuration,
    database::WordbookAsyncDatabaseConnectionPool,
    error::{WordbookError, WordbookResult},
};

use self::{
    authentication::{ensure_logged_in, login, logout},
    books::book_routes,
    session::{WordbookSessionData, WordbookSessionStoreConnector},
    user::create_account,
    words::word_routes,
};

mod authentication;
mod books;
mod parameters;
mod session;
pub(crate) mod user;
mod words;

pub(crate) type WebDatabaseConnectionPool = Extension<WordbookAsyncDatabaseConnectionPool>;
pub(crate) type WebConfiguration = Extension<Arc<Configuration>>;

#[instrument(err, skip(database_connection_pool, configuration))]
pub async fn run_web_api(
    database_connection_pool: WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> WordbookResult<()> {
    info!("Starting web API");

    let router = build_router(database_connection_pool, configuration);

    debug!(
        "Listening for API requests on {}",
        configuration.api_listen_address
    );
    axum::Server::bind(&configuration.api_listen_address)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| WordbookError::ApiServerError {
            source: Box::new(error),
        })?;

    info!("Web API terminated normally");
    Ok(())
}

fn build_router(
    database_connection_pool: WordbookAsyncDatabaseConnectionPool,
    configuration: &Configuration,
) -> Router {
    let session_store_connector =
        WordbookSessionStoreConnector::new(database_connection_pool.clone(), configuration);

    // The session check runs before the method dispatch.
    // Anonymous requests with unsupported methods get 401, not 405.
    let logged_in_routes = Router::new()
        .route("/api/book", book_routes())
        .route("/api/word", word_routes())
        .route_layer(middleware::from_fn(ensure_logged_in));

    Router::new()
        .route("/", get(hello))
        .route("/api/accounts/create", post(create_account))
        .route("/api/accounts/login", post(login))
        .route("/api/accounts/logout", post(logout))
        .merge(logged_in_routes)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_session_layer_error))
                .layer(SessionLayer::<WordbookSessionData, WordbookSessionStoreConnector>::new()),
        )
        // The session layer reads the connector from the request extensions.
        .layer(Extension(session_store_connector))
        .layer(Extension(database_connection_pool))
        .layer(Extension(Arc::new(configuration.clone())))
}

async fn handle_session_layer_error(
    error: SessionLayerError<WordbookError, Infallible>,
) -> Response {
    WordbookError::SessionLayer {
        source: Box::new(error),
    }
    .into_response()
}

async fn hello() -> &'static str {
    "Wordbook API"
}

/// The answer to methods not supported on a route.
async fn method_not_allowed(method: Method) -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(ALLOW, "GET, POST, DELETE, PUT")],
        format!("Method {method} Not Allowed"),
    )
}

async fn shutdown_signal() {
    let sigint = async {
        if let Err(error) =
            tokio::signal::ctrl_c()
                .await
                .map_err(|error| WordbookError::ApiServerError {
                    source: Box::new(error),
                })
        {
            error!("Error receiving SIGINT: {error}");
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut handler) => {
                if handler.recv().await.is_none() {
                    error!("Received None from SIGTERM handler. This is unexpected.");
                }
            }
            Err(error) => error!("Error installing SIGTERM handler: {error}"),
        }
    };

    // This future never completes, hence we offer no other means of shutdown on non-unix platforms.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = sigint => info!("Received SIGINT, shutting down"),
        _ = sigterm => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use super::build_router;
    use crate::{configuration::Configuration, database::create_async_database_connection_pool};

    /// Requests without a session cookie never reach the session store.
    async fn router() -> Router {
        let configuration = Configuration::test_configuration();
        let database_connection_pool = create_async_database_connection_pool(&configuration)
            .await
            .unwrap();
        build_router(database_connection_pool, &configuration)
    }

    async fn send(request: Request<Body>) -> (StatusCode, String) {
        let response = router().await.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_hello() {
        let (status, body) = send(Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Wordbook API");
    }

    #[tokio::test]
    async fn test_anonymous_book_request_is_unauthenticated() {
        let (status, body) = send(Request::get("/api/book").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn test_session_is_checked_before_the_method() {
        let (status, body) = send(
            Request::patch("/api/word")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, "");
    }
}
