use api_commands::{
    Book, CreateAccount, CreateBook, CreateBookResponse, CreateWord, CreateWordResponse, Login,
    UpdateWord, Word, WordList,
};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use secure_string::SecureString;
use thiserror::Error;

use crate::quiz::AnswerRecord;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("not logged in")]
    Unauthenticated,

    #[error("server answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// A session with the wordbook API.
///
/// Cloning is cheap, and clones share the session cookie.
#[derive(Debug, Clone)]
pub struct WordbookClient {
    client: Client,
    base_url: String,
}

impl WordbookClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = ClientBuilder::new().cookie_store(true).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn create_account(&self, name: &str, password: &SecureString) -> ClientResult<()> {
        let response = self
            .client
            .post(self.url("/api/accounts/create"))
            .json(&CreateAccount {
                name: name.to_owned(),
                password: password.clone(),
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn login(&self, name: &str, password: &SecureString) -> ClientResult<()> {
        let response = self
            .client
            .post(self.url("/api/accounts/login"))
            .json(&Login {
                name: name.to_owned(),
                password: password.clone(),
            })
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn logout(&self) -> ClientResult<()> {
        let response = self
            .client
            .post(self.url("/api/accounts/logout"))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    pub async fn list_books(&self) -> ClientResult<Vec<Book>> {
        let response = self.client.get(self.url("/api/book")).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn get_book(&self, book_id: i64) -> ClientResult<Option<Book>> {
        let response = self
            .client
            .get(self.url("/api/book"))
            .query(&[("bookId", book_id)])
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn create_book(&self, name: &str, description: Option<&str>) -> ClientResult<i64> {
        let response = self
            .client
            .post(self.url("/api/book"))
            .json(&CreateBook {
                name: name.to_owned(),
                description: description.map(ToOwned::to_owned),
            })
            .send()
            .await?;
        let response: CreateBookResponse = check_status(response).await?.json().await?;
        Ok(response.book_id)
    }

    /// Returns `false` if the book did not exist.
    pub async fn delete_book(&self, book_id: i64) -> ClientResult<bool> {
        let response = self
            .client
            .delete(self.url("/api/book"))
            .query(&[("bookId", book_id)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    pub async fn list_words(&self, book_id: i64) -> ClientResult<Vec<Word>> {
        let response = self
            .client
            .get(self.url("/api/word"))
            .query(&[("bookId", book_id)])
            .send()
            .await?;
        let word_list: WordList = check_status(response).await?.json().await?;
        Ok(word_list.words)
    }

    pub async fn create_word(
        &self,
        book_id: i64,
        user_id: i64,
        word: &str,
        meaning: &str,
    ) -> ClientResult<i64> {
        let response = self
            .client
            .post(self.url("/api/word"))
            .json(&CreateWord {
                book_id,
                word: word.to_owned(),
                meaning: meaning.to_owned(),
                user_id,
            })
            .send()
            .await?;
        let response: CreateWordResponse = check_status(response).await?.json().await?;
        Ok(response.word_id)
    }

    /// Returns `false` if the word did not exist.
    pub async fn delete_word(&self, word_id: i64) -> ClientResult<bool> {
        let response = self
            .client
            .delete(self.url("/api/word"))
            .query(&[("wordId", word_id)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }

    /// Store the counters of a word after a quiz answer.
    pub async fn record_answer(&self, answer: AnswerRecord) -> ClientResult<Word> {
        let response = self
            .client
            .put(self.url("/api/word"))
            .json(&UpdateWord::from(answer))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::UNAUTHORIZED {
        Err(ClientError::Unauthenticated)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status { status, body })
    }
}
