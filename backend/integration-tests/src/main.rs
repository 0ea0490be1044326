use anyhow::Context;
use api_commands::{
    Book, CreateAccount, CreateBook, CreateBookResponse, CreateWord, CreateWordResponse, Login,
    UpdateBook, UpdateWord, Word, WordList,
};
use log::info;
use reqwest::{header::ALLOW, Method, StatusCode};
use secure_string::SecureString;
use simplelog::TermLogger;
use wordbook_client::{
    client::WordbookClient,
    quiz::{rank_words, Outcome, Quiz, QuizState},
};

use crate::util::{assert_response_status, expect_json, expect_text, HttpClient, BASE_URL};

mod util;

fn initialise_logging() -> anyhow::Result<()> {
    TermLogger::init(
        log::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .context("cannot initialise logging")?;

    info!("Logging initialised");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    initialise_logging()?;
    let client = HttpClient::new().await;

    test_liveness(&client).await;
    test_anonymous_requests_are_unauthenticated(&client).await;
    let name = test_user_account_creation(&client).await;
    test_login(&client, &name).await;
    test_bad_requests(&client).await;
    test_book_crud(&client).await;
    let book_id = test_word_crud(&client).await;
    test_quiz_order(&client, book_id).await;
    test_quiz_records_answers(&name).await?;
    test_book_deletion_cascades(&client, book_id).await;
    test_logout(&client).await;

    info!("Finished");
    Ok(())
}

fn password() -> SecureString {
    "correct horse battery staple".into()
}

async fn test_liveness(client: &HttpClient) {
    let text = expect_text(client.get("/").await, StatusCode::OK).await;
    assert_eq!(text, "Wordbook API");
    info!("Server is alive");
}

async fn test_anonymous_requests_are_unauthenticated(client: &HttpClient) {
    let text = expect_text(client.get("/api/book").await, StatusCode::UNAUTHORIZED).await;
    assert_eq!(text, "");
    let text = expect_text(
        client.get("/api/word?bookId=1").await,
        StatusCode::UNAUTHORIZED,
    )
    .await;
    assert_eq!(text, "");

    // The session is checked before the method.
    assert_response_status(
        client.request(Method::PATCH, "/api/book").await,
        StatusCode::UNAUTHORIZED,
    )
    .await;
    info!("Anonymous requests are rejected");
}

async fn test_user_account_creation(client: &HttpClient) -> String {
    let name = format!(
        "integration-test-{}",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );

    let response = client
        .post(
            "/api/accounts/create",
            CreateAccount {
                name: name.clone(),
                password: password(),
            },
        )
        .await;
    assert_response_status(response, StatusCode::CREATED).await;

    let response = client
        .post(
            "/api/accounts/create",
            CreateAccount {
                name: name.clone(),
                password: password(),
            },
        )
        .await;
    assert_response_status(response, StatusCode::CONFLICT).await;

    let response = client
        .post(
            "/api/accounts/create",
            CreateAccount {
                name: format!("{name}-short-password"),
                password: "short".into(),
            },
        )
        .await;
    assert_response_status(response, StatusCode::BAD_REQUEST).await;

    info!("Created account {name:?}");
    name
}

async fn test_login(client: &HttpClient, name: &str) {
    let response = client
        .post(
            "/api/accounts/login",
            Login {
                name: name.to_owned(),
                password: "wrong password".into(),
            },
        )
        .await;
    assert_response_status(response, StatusCode::UNAUTHORIZED).await;

    let response = client
        .post(
            "/api/accounts/login",
            Login {
                name: name.to_owned(),
                password: password(),
            },
        )
        .await;
    assert_response_status(response, StatusCode::NO_CONTENT).await;

    let books: Vec<Book> = expect_json(client.get("/api/book").await, StatusCode::OK).await;
    assert!(books.is_empty());
    info!("Logged in");
}

async fn test_bad_requests(client: &HttpClient) {
    let text = expect_text(
        client.get("/api/book?bookId=x1,x2").await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(text, "Bad request. siteId parameter cannot be an array.");

    let text = expect_text(
        client.delete("/api/word?wordId=1&wordId=2").await,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(text, "Bad request. wordId parameter cannot be an array.");

    let response = client.request(Method::PATCH, "/api/book").await;
    assert_eq!(response.headers()[ALLOW], "GET, POST, DELETE, PUT");
    let text = expect_text(response, StatusCode::METHOD_NOT_ALLOWED).await;
    assert_eq!(text, "Method PATCH Not Allowed");

    let response = client
        .post(
            "/api/book",
            CreateBook {
                name: String::new(),
                description: None,
            },
        )
        .await;
    assert_response_status(response, StatusCode::BAD_REQUEST).await;
    info!("Bad requests are rejected");
}

async fn test_book_crud(client: &HttpClient) {
    let mut book_ids = Vec::new();
    for name in ["Old book", "New book"] {
        let response: CreateBookResponse = expect_json(
            client
                .post(
                    "/api/book",
                    CreateBook {
                        name: name.to_owned(),
                        description: Some(format!("description of {name}")),
                    },
                )
                .await,
            StatusCode::CREATED,
        )
        .await;
        book_ids.push(response.book_id);
    }

    let books: Vec<Book> = expect_json(client.get("/api/book").await, StatusCode::OK).await;
    let names: Vec<_> = books.iter().map(|book| book.name.as_str()).collect();
    assert_eq!(names, ["New book", "Old book"]);
    assert!(books.iter().all(|book| !book.is_public));

    let book: Option<Book> = expect_json(
        client
            .get(&format!("/api/book?bookId={}", book_ids[0]))
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(book.map(|book| book.name), Some("Old book".to_owned()));

    let book: Option<Book> = expect_json(
        client.get("/api/book?bookId=-1").await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(book, None);

    let book: Book = expect_json(
        client
            .put(
                "/api/book",
                UpdateBook {
                    id: book_ids[0],
                    name: Some("Renamed book".to_owned()),
                    description: None,
                },
            )
            .await,
        StatusCode::OK,
    )
    .await;
    assert_eq!(book.name, "Renamed book");
    assert_eq!(book.description.as_deref(), Some("description of Old book"));

    let response = client
        .put(
            "/api/book",
            UpdateBook {
                id: -1,
                name: Some("Nothing".to_owned()),
                description: None,
            },
        )
        .await;
    assert_response_status(response, StatusCode::NOT_FOUND).await;

    for book_id in book_ids {
        assert_response_status(
            client.delete(&format!("/api/book?bookId={book_id}")).await,
            StatusCode::OK,
        )
        .await;
    }
    info!("Book CRUD works");
}

/// Returns the id of a book with three words whose counters are A(0/0), B(1/2) and C(0/1).
async fn test_word_crud(client: &HttpClient) -> i64 {
    let response: CreateBookResponse = expect_json(
        client
            .post(
                "/api/book",
                CreateBook {
                    name: "Animals".to_owned(),
                    description: None,
                },
            )
            .await,
        StatusCode::CREATED,
    )
    .await;
    let book_id = response.book_id;
    let book: Option<Book> = expect_json(
        client.get(&format!("/api/book?bookId={book_id}")).await,
        StatusCode::OK,
    )
    .await;
    let user_id = book.unwrap().user_id;

    let mut word_ids = Vec::new();
    for (word, meaning) in [("A", "dog"), ("B", "cat"), ("C", "bird")] {
        let response: CreateWordResponse = expect_json(
            client
                .post(
                    "/api/word",
                    CreateWord {
                        book_id,
                        word: word.to_owned(),
                        meaning: meaning.to_owned(),
                        user_id,
                    },
                )
                .await,
            StatusCode::CREATED,
        )
        .await;
        word_ids.push(response.word_id);
    }

    let word_list: WordList = expect_json(
        client.get(&format!("/api/word?bookId={book_id}")).await,
        StatusCode::OK,
    )
    .await;
    let words: Vec<_> = word_list.words.iter().map(|word| word.word.as_str()).collect();
    assert_eq!(words, ["C", "B", "A"]);
    assert!(word_list
        .words
        .iter()
        .all(|word| word.answers == 0 && word.correct == 0));

    let response = client
        .put(
            "/api/word",
            UpdateWord {
                word_id: word_ids[1],
                answers: Some(1),
                correct: Some(2),
                ..Default::default()
            },
        )
        .await;
    assert_response_status(response, StatusCode::BAD_REQUEST).await;

    for (word_id, answers, correct) in [(word_ids[1], 2, 1), (word_ids[2], 1, 0)] {
        let word: Word = expect_json(
            client
                .put(
                    "/api/word",
                    UpdateWord {
                        word_id,
                        answers: Some(answers),
                        correct: Some(correct),
                        ..Default::default()
                    },
                )
                .await,
            StatusCode::OK,
        )
        .await;
        assert_eq!((word.answers, word.correct), (answers, correct));
    }

    let response = client
        .put(
            "/api/word",
            UpdateWord {
                word_id: -1,
                meaning: Some("nothing".to_owned()),
                ..Default::default()
            },
        )
        .await;
    assert_response_status(response, StatusCode::NOT_FOUND).await;

    // A word to delete again.
    let response: CreateWordResponse = expect_json(
        client
            .post(
                "/api/word",
                CreateWord {
                    book_id,
                    word: "D".to_owned(),
                    meaning: "fish".to_owned(),
                    user_id,
                },
            )
            .await,
        StatusCode::CREATED,
    )
    .await;
    let path = format!("/api/word?wordId={}", response.word_id);
    assert_response_status(client.delete(&path).await, StatusCode::OK).await;
    assert_response_status(client.delete(&path).await, StatusCode::NOT_FOUND).await;

    info!("Word CRUD works");
    book_id
}

async fn test_quiz_order(client: &HttpClient, book_id: i64) {
    let word_list: WordList = expect_json(
        client.get(&format!("/api/word?bookId={book_id}")).await,
        StatusCode::OK,
    )
    .await;
    let ranked: Vec<_> = rank_words(&word_list.words)
        .into_iter()
        .map(|word| word.word)
        .collect();
    assert_eq!(ranked, ["A", "C", "B"]);
    info!("Quiz order is by correctness ratio");
}

/// Run a whole quiz through the client library and check the stored counters.
async fn test_quiz_records_answers(name: &str) -> anyhow::Result<()> {
    let client = WordbookClient::new(BASE_URL)?;
    client.login(name, &password()).await?;

    let books = client.list_books().await?;
    let book = books
        .iter()
        .find(|book| book.name == "Animals")
        .context("missing book")?;
    let mut quiz = Quiz::new(&client.list_words(book.id).await?);

    while let QuizState::Presenting(index) = quiz.state() {
        let outcome = if index % 2 == 0 {
            Outcome::KnewIt
        } else {
            Outcome::DidNotKnow
        };
        let answer = quiz.mark(outcome)?;
        let word = client.record_answer(answer).await?;
        assert_eq!((word.answers, word.correct), (answer.answers, answer.correct));
        quiz.advance()?;
    }

    // A(0/0) knew it, C(0/1) did not know, B(1/2) knew it
    let mut counters: Vec<_> = client
        .list_words(book.id)
        .await?
        .into_iter()
        .map(|word| (word.word, word.answers, word.correct))
        .collect();
    counters.sort();
    assert_eq!(
        counters,
        [
            ("A".to_owned(), 1, 1),
            ("B".to_owned(), 3, 2),
            ("C".to_owned(), 2, 0)
        ]
    );

    client.logout().await?;
    info!("Quiz answers are recorded");
    Ok(())
}

async fn test_book_deletion_cascades(client: &HttpClient, book_id: i64) {
    let path = format!("/api/book?bookId={book_id}");
    assert_response_status(client.delete(&path).await, StatusCode::OK).await;

    let word_list: WordList = expect_json(
        client.get(&format!("/api/word?bookId={book_id}")).await,
        StatusCode::OK,
    )
    .await;
    assert!(word_list.words.is_empty());
    let book: Option<Book> = expect_json(client.get(&path).await, StatusCode::OK).await;
    assert_eq!(book, None);

    assert_response_status(client.delete(&path).await, StatusCode::NOT_FOUND).await;
    info!("Book deletion removes the words");
}

async fn test_logout(client: &HttpClient) {
    assert_response_status(
        client.post_empty("/api/accounts/logout").await,
        StatusCode::NO_CONTENT,
    )
    .await;
    assert_response_status(client.get("/api/book").await, StatusCode::UNAUTHORIZED).await;
    info!("Logged out");
}
