//! Types exchanged between the wordbook backend and its clients.
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use secure_string::SecureString;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateAccount {
    pub name: String,
    pub password: SecureString,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Login {
    pub name: String,
    pub password: SecureString,
}

/// A named collection of words owned by one user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_id: i64,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A word/meaning pair with its quiz counters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: i64,
    pub word: String,
    pub meaning: String,
    /// How often the word was asked in a quiz.
    pub answers: i32,
    /// How often the user knew the word. Never larger than `answers`.
    pub correct: i32,
    pub book_id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookResponse {
    pub book_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateWord {
    pub book_id: i64,
    pub word: String,
    pub meaning: String,
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateWordResponse {
    pub word_id: i64,
}

/// Changes to a word. Absent fields stay as they are.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWord {
    pub word_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WordList {
    pub words: Vec<Word>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_uses_camel_case() {
        let book = Book {
            id: 3,
            name: "Verbs".to_owned(),
            description: None,
            user_id: 7,
            is_public: false,
            created_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        };
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["isPublic"], false);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_update_word_omits_absent_fields() {
        let update = UpdateWord {
            word_id: 1,
            answers: Some(2),
            correct: Some(1),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"wordId": 1, "answers": 2, "correct": 1})
        );
    }

    #[test]
    fn test_create_book_description_is_optional() {
        let create: CreateBook = serde_json::from_str(r#"{"name": "Nouns"}"#).unwrap();
        assert_eq!(create.name, "Nouns");
        assert_eq!(create.description, None);
    }
}
