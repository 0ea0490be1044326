use api_commands::{Book, Word};
use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Identifiable, Insertable, Queryable, Selectable};

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_id: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::database::schema::books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewBook<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub user_id: i64,
    pub is_public: bool,
}

/// Changes to a book, `None` fields are left untouched.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = crate::database::schema::books)]
pub struct BookChangeset<'a> {
    pub name: Option<&'a str>,
    pub description: Option<&'a str>,
}

impl BookChangeset<'_> {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::words)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WordRow {
    pub id: i64,
    pub word: String,
    pub meaning: String,
    pub answers: i32,
    pub correct: i32,
    pub book_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::database::schema::words)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewWord<'a> {
    pub word: &'a str,
    pub meaning: &'a str,
    pub answers: i32,
    pub correct: i32,
    pub book_id: i64,
    pub user_id: i64,
}

/// Changes to a word, `None` fields are left untouched.
#[derive(AsChangeset, Debug, Default, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::database::schema::words)]
pub struct WordChangeset<'a> {
    pub word: Option<&'a str>,
    pub meaning: Option<&'a str>,
    pub answers: Option<i32>,
    pub correct: Option<i32>,
}

impl WordChangeset<'_> {
    pub fn is_empty(&self) -> bool {
        self.word.is_none()
            && self.meaning.is_none()
            && self.answers.is_none()
            && self.correct.is_none()
    }
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            user_id: row.user_id,
            is_public: row.is_public,
            created_at: row.created_at,
        }
    }
}

impl From<WordRow> for Word {
    fn from(row: WordRow) -> Self {
        Self {
            id: row.id,
            word: row.word,
            meaning: row.meaning,
            answers: row.answers,
            correct: row.correct,
            book_id: row.book_id,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}
