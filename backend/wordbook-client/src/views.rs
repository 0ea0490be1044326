//! Terminal screens for managing books and words and for running quizzes.
//!
//! Rendering and command parsing are pure functions, [`run`] does the I/O.

use std::{collections::HashSet, fmt::Write};

use api_commands::{Book, Word};
use log::{debug, warn};
use tokio::{
    io::{AsyncBufRead, Lines},
    task::JoinSet,
};

use crate::{
    client::{ClientResult, WordbookClient},
    quiz::{AnswerRecord, Outcome, Quiz, QuizState},
};

pub fn render_book_list(books: &[Book]) -> String {
    let mut text = String::from("Books\n");
    if books.is_empty() {
        text.push_str("  (no books yet)\n");
    }
    for (index, book) in books.iter().enumerate() {
        let _ = write!(text, "  {}. {}", index + 1, book.name);
        if let Some(description) = book.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(text, " - {description}");
        }
        text.push('\n');
    }
    text.push_str("Commands: add <name> [| <description>], open <n>, delete <n>, quit\n");
    text
}

/// Meanings are hidden unless the word's id is in `revealed`.
pub fn render_word_list(book: &Book, words: &[Word], revealed: &HashSet<i64>) -> String {
    let mut text = format!("{}\n", book.name);
    if let Some(description) = book.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(text, "{description}");
    }
    if words.is_empty() {
        text.push_str("  (no words yet)\n");
    }
    for (index, word) in words.iter().enumerate() {
        let _ = write!(text, "  {}. {}", index + 1, word.word);
        if revealed.contains(&word.id) {
            let _ = write!(text, " = {}", word.meaning);
        }
        let _ = writeln!(text, " ({}/{})", word.correct, word.answers);
    }
    text.push_str("Commands: add <word> | <meaning>, show <n>, delete <n>, quiz, back\n");
    text
}

pub fn render_quiz(quiz: &Quiz) -> String {
    let count = quiz.words().len();
    match (quiz.state(), quiz.current_word()) {
        (QuizState::Presenting(index), Some(word)) => format!(
            "Word {} of {count}: {}\nCommands: k (knew it), d (did not know), r (restart), b (back to book)\n",
            index + 1,
            word.word
        ),
        (QuizState::Revealed(index), Some(word)) => format!(
            "Word {} of {count}: {} = {}\nCommands: n (next), r (restart), b (back to book)\n",
            index + 1,
            word.word,
            word.meaning
        ),
        _ => "Quiz finished.\nCommands: r (restart), b (back to book)\n".to_owned(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookListCommand {
    Add {
        name: String,
        description: Option<String>,
    },
    Open(usize),
    Delete(usize),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordListCommand {
    Add { word: String, meaning: String },
    /// Toggle whether the meaning is shown.
    Show(usize),
    Delete(usize),
    Quiz,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizCommand {
    Answer(Outcome),
    Next,
    Restart,
    Back,
}

pub fn parse_book_list_command(line: &str) -> Option<BookListCommand> {
    let (command, argument) = split_command(line);
    match command {
        "add" => {
            let (name, description) = match argument.split_once('|') {
                Some((name, description)) => (name.trim(), Some(description.trim())),
                None => (argument, None),
            };
            if name.is_empty() {
                return None;
            }
            Some(BookListCommand::Add {
                name: name.to_owned(),
                description: description.filter(|d| !d.is_empty()).map(ToOwned::to_owned),
            })
        }
        "open" => parse_position(argument).map(BookListCommand::Open),
        "delete" => parse_position(argument).map(BookListCommand::Delete),
        "quit" => Some(BookListCommand::Quit),
        _ => None,
    }
}

pub fn parse_word_list_command(line: &str) -> Option<WordListCommand> {
    let (command, argument) = split_command(line);
    match command {
        "add" => {
            let (word, meaning) = argument.split_once('|')?;
            let (word, meaning) = (word.trim(), meaning.trim());
            if word.is_empty() || meaning.is_empty() {
                return None;
            }
            Some(WordListCommand::Add {
                word: word.to_owned(),
                meaning: meaning.to_owned(),
            })
        }
        "show" => parse_position(argument).map(WordListCommand::Show),
        "delete" => parse_position(argument).map(WordListCommand::Delete),
        "quiz" => Some(WordListCommand::Quiz),
        "back" => Some(WordListCommand::Back),
        _ => None,
    }
}

pub fn parse_quiz_command(line: &str) -> Option<QuizCommand> {
    match line.trim() {
        "k" => Some(QuizCommand::Answer(Outcome::KnewIt)),
        "d" => Some(QuizCommand::Answer(Outcome::DidNotKnow)),
        "n" => Some(QuizCommand::Next),
        "r" => Some(QuizCommand::Restart),
        "b" => Some(QuizCommand::Back),
        _ => None,
    }
}

fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    }
}

/// Parse a one-based list position into an index.
fn parse_position(argument: &str) -> Option<usize> {
    argument.parse::<usize>().ok()?.checked_sub(1)
}

enum Screen {
    Books(Vec<Book>),
    Words {
        book: Book,
        words: Vec<Word>,
        /// Ids of the words whose meaning is shown.
        revealed: HashSet<i64>,
    },
    Quiz {
        book: Book,
        quiz: Quiz,
    },
}

impl Screen {
    fn words(book: Book, words: Vec<Word>) -> Self {
        Screen::Words {
            book,
            words,
            revealed: HashSet::new(),
        }
    }

    fn render(&self) -> String {
        match self {
            Screen::Books(books) => render_book_list(books),
            Screen::Words {
                book,
                words,
                revealed,
            } => render_word_list(book, words, revealed),
            Screen::Quiz { quiz, .. } => render_quiz(quiz),
        }
    }
}

/// Quiz answers that are sent to the server while the quiz goes on.
struct PendingAnswers {
    tasks: JoinSet<()>,
}

impl PendingAnswers {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    fn record(&mut self, client: &WordbookClient, answer: AnswerRecord) {
        let client = client.clone();
        self.tasks.spawn(async move {
            if let Err(error) = client.record_answer(answer).await {
                warn!("Could not record answer {answer:?}: {error}");
            }
        });
    }

    /// Wait until every answer sent so far was stored or has failed.
    async fn wait(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(error) = result {
                warn!("Answer task did not finish: {error}");
            }
        }
    }
}

/// Run the interactive screens until the user quits or the input ends.
///
/// Returns only after all quiz answers were sent.
pub async fn run<R: AsyncBufRead + Unpin>(
    client: &WordbookClient,
    lines: &mut Lines<R>,
) -> ClientResult<()> {
    let mut pending_answers = PendingAnswers::new();
    let result = run_screens(client, lines, &mut pending_answers).await;
    pending_answers.wait().await;
    result
}

async fn run_screens<R: AsyncBufRead + Unpin>(
    client: &WordbookClient,
    lines: &mut Lines<R>,
    pending_answers: &mut PendingAnswers,
) -> ClientResult<()> {
    let mut screen = Screen::Books(client.list_books().await?);

    loop {
        print!("\n{}> ", screen.render());
        flush_stdout();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!("Could not read from stdin: {error}");
                break;
            }
        };

        screen = match screen {
            Screen::Books(books) => {
                let Some(command) = parse_book_list_command(&line) else {
                    println!("Unknown command");
                    screen = Screen::Books(books);
                    continue;
                };
                match handle_book_list_command(client, books, command).await? {
                    Some(screen) => screen,
                    None => break,
                }
            }
            Screen::Words {
                book,
                words,
                revealed,
            } => match parse_word_list_command(&line) {
                Some(command) => {
                    handle_word_list_command(client, book, words, revealed, command).await?
                }
                None => {
                    println!("Unknown command");
                    Screen::Words {
                        book,
                        words,
                        revealed,
                    }
                }
            },
            Screen::Quiz { book, quiz } => match parse_quiz_command(&line) {
                Some(command) => {
                    handle_quiz_command(client, pending_answers, book, quiz, command).await?
                }
                None => {
                    println!("Unknown command");
                    Screen::Quiz { book, quiz }
                }
            },
        };
    }

    Ok(())
}

/// Returns `None` when the user quits.
async fn handle_book_list_command(
    client: &WordbookClient,
    books: Vec<Book>,
    command: BookListCommand,
) -> ClientResult<Option<Screen>> {
    let screen = match command {
        BookListCommand::Add { name, description } => {
            client.create_book(&name, description.as_deref()).await?;
            Screen::Books(client.list_books().await?)
        }
        BookListCommand::Open(index) => match books.get(index) {
            Some(book) => {
                let words = client.list_words(book.id).await?;
                Screen::words(book.clone(), words)
            }
            None => {
                println!("No book at this position");
                Screen::Books(books)
            }
        },
        BookListCommand::Delete(index) => match books.get(index) {
            Some(book) => {
                if !client.delete_book(book.id).await? {
                    println!("The book was already deleted");
                }
                Screen::Books(client.list_books().await?)
            }
            None => {
                println!("No book at this position");
                Screen::Books(books)
            }
        },
        BookListCommand::Quit => return Ok(None),
    };
    Ok(Some(screen))
}

async fn handle_word_list_command(
    client: &WordbookClient,
    book: Book,
    words: Vec<Word>,
    mut revealed: HashSet<i64>,
    command: WordListCommand,
) -> ClientResult<Screen> {
    Ok(match command {
        WordListCommand::Add { word, meaning } => {
            client
                .create_word(book.id, book.user_id, &word, &meaning)
                .await?;
            let words = client.list_words(book.id).await?;
            Screen::words(book, words)
        }
        WordListCommand::Delete(index) => match words.get(index) {
            Some(word) => {
                if !client.delete_word(word.id).await? {
                    println!("The word was already deleted");
                }
                let words = client.list_words(book.id).await?;
                Screen::words(book, words)
            }
            None => {
                println!("No word at this position");
                Screen::Words {
                    book,
                    words,
                    revealed,
                }
            }
        },
        WordListCommand::Show(index) => {
            match words.get(index) {
                Some(word) => {
                    if !revealed.remove(&word.id) {
                        revealed.insert(word.id);
                    }
                }
                None => println!("No word at this position"),
            }
            Screen::Words {
                book,
                words,
                revealed,
            }
        }
        WordListCommand::Quiz => start_quiz(client, book).await?,
        WordListCommand::Back => Screen::Books(client.list_books().await?),
    })
}

async fn handle_quiz_command(
    client: &WordbookClient,
    pending_answers: &mut PendingAnswers,
    book: Book,
    mut quiz: Quiz,
    command: QuizCommand,
) -> ClientResult<Screen> {
    match command {
        QuizCommand::Answer(outcome) => match quiz.mark(outcome) {
            Ok(answer) => pending_answers.record(client, answer),
            Err(error) => println!("{error}"),
        },
        QuizCommand::Next => {
            if let Err(error) = quiz.advance() {
                println!("{error}");
            }
        }
        // Both leave the quiz at any point, and the words are fetched
        // again only once the answers given so far are stored.
        QuizCommand::Restart => {
            pending_answers.wait().await;
            return start_quiz(client, book).await;
        }
        QuizCommand::Back => {
            pending_answers.wait().await;
            let words = client.list_words(book.id).await?;
            return Ok(Screen::words(book, words));
        }
    }
    Ok(Screen::Quiz { book, quiz })
}
async fn start_quiz(client: &WordbookClient, book: Book) -> ClientResult<Screen> {
    let words = client.list_words(book.id).await?;
    debug!("Starting quiz over {} words of book {}", words.len(), book.id);
    Ok(Screen::Quiz {
        book,
        quiz: Quiz::new(&words),
    })
}

fn flush_stdout() {
    use std::io::Write;

    if let Err(error) = std::io::stdout().flush() {
        warn!("Could not flush stdout: {error}");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use api_commands::{Book, CreateBook, CreateBookResponse, UpdateWord, WordList};
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        routing::get,
        Json, Router,
    };
    use chrono::{DateTime, Utc};
    use tokio::io::AsyncBufReadExt;

    use super::*;
    use crate::quiz::tests::word;

    fn book(id: i64, name: &str, description: Option<&str>) -> Book {
        Book {
            id,
            name: name.to_owned(),
            description: description.map(ToOwned::to_owned),
            user_id: 1,
            is_public: false,
            created_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_book_list() {
        let text = render_book_list(&[
            book(2, "Verbs", Some("irregular ones")),
            book(1, "Nouns", None),
        ]);
        assert!(text.contains("  1. Verbs - irregular ones\n  2. Nouns\n"));
    }

    #[test]
    fn test_render_empty_book_list() {
        assert!(render_book_list(&[]).contains("(no books yet)"));
    }

    #[test]
    fn test_render_word_list_hides_meanings_until_shown() {
        let book = book(1, "Animals", None);
        let words = [word(3, "犬", 4, 3), word(5, "猫", 0, 0)];

        let text = render_word_list(&book, &words, &HashSet::new());
        assert!(text.starts_with("Animals\n"));
        assert!(text.contains("  1. 犬 (3/4)\n  2. 猫 (0/0)\n"));
        assert!(!text.contains("meaning of"));

        let text = render_word_list(&book, &words, &HashSet::from([5]));
        assert!(text.contains("  1. 犬 (3/4)\n  2. 猫 = meaning of 猫 (0/0)\n"));
    }

    #[test]
    fn test_render_quiz_states() {
        let mut quiz = Quiz::new(&[word(1, "犬", 0, 0)]);
        let presenting = render_quiz(&quiz);
        assert!(presenting.starts_with("Word 1 of 1: 犬\n"));
        assert!(!presenting.contains("meaning of"));

        quiz.mark(Outcome::KnewIt).unwrap();
        assert!(render_quiz(&quiz).starts_with("Word 1 of 1: 犬 = meaning of 犬\n"));

        quiz.advance().unwrap();
        assert!(render_quiz(&quiz).starts_with("Quiz finished."));
    }

    #[test]
    fn test_parse_book_list_commands() {
        assert_eq!(
            parse_book_list_command("add  Verbs | irregular ones "),
            Some(BookListCommand::Add {
                name: "Verbs".to_owned(),
                description: Some("irregular ones".to_owned()),
            })
        );
        assert_eq!(
            parse_book_list_command("add Nouns"),
            Some(BookListCommand::Add {
                name: "Nouns".to_owned(),
                description: None,
            })
        );
        assert_eq!(parse_book_list_command("add"), None);
        assert_eq!(parse_book_list_command("add | only description"), None);
        assert_eq!(parse_book_list_command("open 2"), Some(BookListCommand::Open(1)));
        assert_eq!(parse_book_list_command("delete 0"), None);
        assert_eq!(parse_book_list_command("quit"), Some(BookListCommand::Quit));
    }

    #[test]
    fn test_parse_word_list_commands() {
        assert_eq!(
            parse_word_list_command("add 犬 | dog"),
            Some(WordListCommand::Add {
                word: "犬".to_owned(),
                meaning: "dog".to_owned(),
            })
        );
        assert_eq!(parse_word_list_command("add 犬"), None);
        assert_eq!(parse_word_list_command("add 犬 |"), None);
        assert_eq!(parse_word_list_command("delete 3"), Some(WordListCommand::Delete(2)));
        assert_eq!(parse_word_list_command("show 1"), Some(WordListCommand::Show(0)));
        assert_eq!(parse_word_list_command("show"), None);
        assert_eq!(parse_word_list_command("quiz"), Some(WordListCommand::Quiz));
    }

    #[test]
    fn test_parse_quiz_commands() {
        assert_eq!(
            parse_quiz_command(" k "),
            Some(QuizCommand::Answer(Outcome::KnewIt))
        );
        assert_eq!(
            parse_quiz_command("d"),
            Some(QuizCommand::Answer(Outcome::DidNotKnow))
        );
        assert_eq!(parse_quiz_command("b"), Some(QuizCommand::Back));
        assert_eq!(parse_quiz_command("x"), None);
    }

    /// What the stub server stores and which word updates it received.
    #[derive(Default)]
    struct StubState {
        books: Vec<Book>,
        words: Vec<Word>,
        updates: Vec<UpdateWord>,
    }

    type SharedStubState = Arc<Mutex<StubState>>;

    async fn stub_list_books(State(state): State<SharedStubState>) -> Json<Vec<Book>> {
        Json(state.lock().unwrap().books.clone())
    }

    async fn stub_create_book(
        State(state): State<SharedStubState>,
        Json(create): Json<CreateBook>,
    ) -> Json<CreateBookResponse> {
        let mut state = state.lock().unwrap();
        let book_id = state.books.iter().map(|book| book.id).max().unwrap_or(0) + 1;
        let created = book(book_id, &create.name, create.description.as_deref());
        state.books.push(created);
        Json(CreateBookResponse { book_id })
    }

    async fn stub_list_words(State(state): State<SharedStubState>) -> Json<WordList> {
        Json(WordList {
            words: state.lock().unwrap().words.clone(),
        })
    }

    async fn stub_update_word(
        State(state): State<SharedStubState>,
        Json(update): Json<UpdateWord>,
    ) -> Result<Json<Word>, StatusCode> {
        let mut state = state.lock().unwrap();
        let word = state
            .words
            .iter_mut()
            .find(|word| word.id == update.word_id)
            .ok_or(StatusCode::NOT_FOUND)?;
        if let Some(answers) = update.answers {
            word.answers = answers;
        }
        if let Some(correct) = update.correct {
            word.correct = correct;
        }
        let word = word.clone();
        state.updates.push(update);
        Ok(Json(word))
    }

    async fn stub_delete_word(
        State(state): State<SharedStubState>,
        Query(query): Query<HashMap<String, i64>>,
    ) -> StatusCode {
        let mut state = state.lock().unwrap();
        let word_count = state.words.len();
        state.words.retain(|word| Some(&word.id) != query.get("wordId"));
        if state.words.len() < word_count {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }
    }

    /// Serve a stand-in for the wordbook API on a free local port.
    async fn serve_stub(state: StubState) -> (WordbookClient, SharedStubState) {
        let state = Arc::new(Mutex::new(state));
        let router = Router::new()
            .route("/api/book", get(stub_list_books).post(stub_create_book))
            .route(
                "/api/word",
                get(stub_list_words)
                    .put(stub_update_word)
                    .delete(stub_delete_word),
            )
            .with_state(state.clone());
        let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
            .serve(router.into_make_service());
        let client = WordbookClient::new(format!("http://{}", server.local_addr())).unwrap();
        tokio::spawn(server);
        (client, state)
    }

    fn ids(words: &[Word]) -> Vec<i64> {
        words.iter().map(|word| word.id).collect()
    }

    #[tokio::test]
    async fn test_adding_a_book_shows_the_refreshed_list() {
        let nouns = book(1, "Nouns", None);
        let (client, _) = serve_stub(StubState {
            books: vec![nouns.clone()],
            ..Default::default()
        })
        .await;

        let command = BookListCommand::Add {
            name: "Verbs".to_owned(),
            description: Some("irregular ones".to_owned()),
        };
        let screen = handle_book_list_command(&client, vec![nouns], command)
            .await
            .unwrap();

        let Some(Screen::Books(books)) = screen else {
            panic!("expected the book list");
        };
        let names: Vec<_> = books.iter().map(|book| book.name.as_str()).collect();
        assert_eq!(names, ["Nouns", "Verbs"]);
        assert_eq!(books[1].description.as_deref(), Some("irregular ones"));
    }

    #[tokio::test]
    async fn test_deleting_a_word_shows_the_refreshed_list() {
        let words = vec![word(1, "犬", 0, 0), word(2, "猫", 0, 0)];
        let (client, _) = serve_stub(StubState {
            words: words.clone(),
            ..Default::default()
        })
        .await;

        let screen = handle_word_list_command(
            &client,
            book(1, "Animals", None),
            words,
            HashSet::from([1, 2]),
            WordListCommand::Delete(0),
        )
        .await
        .unwrap();

        let Screen::Words {
            words, revealed, ..
        } = screen
        else {
            panic!("expected the word list");
        };
        assert_eq!(ids(&words), [2]);
        assert!(revealed.is_empty());
    }

    #[tokio::test]
    async fn test_show_toggles_the_meaning() {
        let (client, _) = serve_stub(StubState::default()).await;
        let words = vec![word(1, "犬", 0, 0), word(2, "猫", 0, 0)];

        let screen = handle_word_list_command(
            &client,
            book(1, "Animals", None),
            words.clone(),
            HashSet::from([1]),
            WordListCommand::Show(1),
        )
        .await
        .unwrap();
        let Screen::Words { revealed, .. } = screen else {
            panic!("expected the word list");
        };
        assert_eq!(revealed, HashSet::from([1, 2]));

        let screen = handle_word_list_command(
            &client,
            book(1, "Animals", None),
            words,
            revealed,
            WordListCommand::Show(0),
        )
        .await
        .unwrap();
        let Screen::Words { revealed, .. } = screen else {
            panic!("expected the word list");
        };
        assert_eq!(revealed, HashSet::from([2]));
    }

    #[tokio::test]
    async fn test_answer_is_sent_with_the_new_counters() {
        let words = vec![word(7, "犬", 2, 1)];
        let (client, state) = serve_stub(StubState {
            words: words.clone(),
            ..Default::default()
        })
        .await;
        let mut pending_answers = PendingAnswers::new();

        let screen = handle_quiz_command(
            &client,
            &mut pending_answers,
            book(1, "Animals", None),
            Quiz::new(&words),
            QuizCommand::Answer(Outcome::KnewIt),
        )
        .await
        .unwrap();
        let Screen::Quiz { quiz, .. } = screen else {
            panic!("expected the quiz");
        };
        assert_eq!(quiz.state(), QuizState::Revealed(0));

        pending_answers.wait().await;
        let state = state.lock().unwrap();
        assert_eq!(state.updates.len(), 1);
        let update = &state.updates[0];
        assert_eq!(update.word_id, 7);
        assert_eq!(update.answers, Some(3));
        assert_eq!(update.correct, Some(2));
        assert_eq!(update.word, None);
        assert_eq!(update.meaning, None);
    }

    #[tokio::test]
    async fn test_restart_ranks_with_the_stored_answers() {
        let words = vec![word(1, "犬", 2, 1), word(2, "猫", 0, 0)];
        let (client, _) = serve_stub(StubState {
            words: words.clone(),
            ..Default::default()
        })
        .await;
        let mut pending_answers = PendingAnswers::new();
        let quiz = Quiz::new(&words);
        assert_eq!(ids(quiz.words()), [2, 1]);

        let screen = handle_quiz_command(
            &client,
            &mut pending_answers,
            book(1, "Animals", None),
            quiz,
            QuizCommand::Answer(Outcome::KnewIt),
        )
        .await
        .unwrap();
        let Screen::Quiz { book, quiz } = screen else {
            panic!("expected the quiz");
        };

        // Restarting before the quiz is finished.
        let screen = handle_quiz_command(
            &client,
            &mut pending_answers,
            book,
            quiz,
            QuizCommand::Restart,
        )
        .await
        .unwrap();
        let Screen::Quiz { quiz, .. } = screen else {
            panic!("expected the quiz");
        };
        assert_eq!(quiz.state(), QuizState::Presenting(0));
        assert_eq!(ids(quiz.words()), [1, 2]);
        assert_eq!((quiz.words()[1].answers, quiz.words()[1].correct), (1, 1));
    }

    #[tokio::test]
    async fn test_commands_after_the_password_line_are_run() {
        let (client, state) = serve_stub(StubState::default()).await;
        let input: &[u8] = b"secret\nadd Verbs\nquit\n";
        let mut lines = tokio::io::BufReader::new(input).lines();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("secret"));
        run(&client, &mut lines).await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.books.len(), 1);
        assert_eq!(state.books[0].name, "Verbs");
    }

    #[tokio::test]
    async fn test_run_returns_after_answers_are_stored() {
        let (client, state) = serve_stub(StubState {
            books: vec![book(1, "Animals", None)],
            words: vec![word(1, "犬", 0, 0)],
            ..Default::default()
        })
        .await;
        // The input ends in the middle of the quiz.
        let input: &[u8] = b"open 1\nquiz\nk\n";
        let mut lines = tokio::io::BufReader::new(input).lines();

        run(&client, &mut lines).await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.updates.len(), 1);
        assert_eq!((state.words[0].answers, state.words[0].correct), (1, 1));
    }

    #[tokio::test]
    async fn test_back_leaves_an_unfinished_quiz() {
        let words = vec![word(1, "犬", 0, 0), word(2, "猫", 0, 0)];
        let (client, _) = serve_stub(StubState {
            words: words.clone(),
            ..Default::default()
        })
        .await;
        let mut pending_answers = PendingAnswers::new();

        let screen = handle_quiz_command(
            &client,
            &mut pending_answers,
            book(1, "Animals", None),
            Quiz::new(&words),
            QuizCommand::Answer(Outcome::DidNotKnow),
        )
        .await
        .unwrap();
        let Screen::Quiz { book, quiz } = screen else {
            panic!("expected the quiz");
        };
        assert_eq!(quiz.state(), QuizState::Revealed(0));

        let screen = handle_quiz_command(&client, &mut pending_answers, book, quiz, QuizCommand::Back)
            .await
            .unwrap();
        let Screen::Words { words, .. } = screen else {
            panic!("expected the word list");
        };
        assert_eq!(ids(&words), [1, 2]);
        assert_eq!((words[0].answers, words[0].correct), (1, 0));
    }
}
