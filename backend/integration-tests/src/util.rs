use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

pub static BASE_URL: &str = "http://localhost:8093";

/// A client with its own cookie store, hence its own session.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client, waiting up to ten seconds for the server to come up.
    pub async fn new() -> Self {
        let client = ClientBuilder::new().cookie_store(true).build().unwrap();

        for _ in 0..10 {
            match client.get(BASE_URL).send().await {
                Ok(_) => break,
                Err(error) => {
                    if !error.is_connect() {
                        panic!("{error}");
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        Self { client }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{BASE_URL}{path}"))
            .send()
            .await
            .unwrap()
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: T) -> Response {
        self.client
            .post(format!("{BASE_URL}{path}"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn post_empty(&self, path: &str) -> Response {
        self.client
            .post(format!("{BASE_URL}{path}"))
            .send()
            .await
            .unwrap()
    }

    pub async fn put<T: Serialize>(&self, path: &str, body: T) -> Response {
        self.client
            .put(format!("{BASE_URL}{path}"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(format!("{BASE_URL}{path}"))
            .send()
            .await
            .unwrap()
    }

    pub async fn request(&self, method: reqwest::Method, path: &str) -> Response {
        self.client
            .request(method, format!("{BASE_URL}{path}"))
            .send()
            .await
            .unwrap()
    }
}

pub async fn assert_response_status(response: Response, status: StatusCode) {
    assert_eq!(
        response.status(),
        status,
        "unexpected response:\n{:?}\n",
        std::str::from_utf8(response.bytes().await.unwrap().as_ref()),
    );
}

/// Assert the status and return the body text.
pub async fn expect_text(response: Response, status: StatusCode) -> String {
    let actual_status = response.status();
    let text = response.text().await.unwrap();
    assert_eq!(actual_status, status, "unexpected response:\n{text:?}\n");
    text
}

/// Assert the status and decode the JSON body.
pub async fn expect_json<T: DeserializeOwned>(response: Response, status: StatusCode) -> T {
    let text = expect_text(response, status).await;
    serde_json::from_str(&text).unwrap_or_else(|error| panic!("{error}: {text:?}"))
}
