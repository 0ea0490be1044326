//! The quiz over the words of one book.
//!
//! Words are ranked once when the quiz starts, weakest first, and then presented one by one.
//! Each word is first shown without its meaning, the user says whether they knew it,
//! and then the meaning is revealed until the user advances to the next word.

use std::cmp::Ordering;

use api_commands::{UpdateWord, Word};
use thiserror::Error;

/// Order words by their correctness ratio `correct / answers`, lowest first.
///
/// Unanswered words have ratio zero.
/// The sort is stable, so words with equal ratio keep their relative order.
pub fn rank_words(words: &[Word]) -> Vec<Word> {
    let mut ranked = words.to_vec();
    ranked.sort_by(compare_correctness_ratio);
    ranked
}

fn compare_correctness_ratio(a: &Word, b: &Word) -> Ordering {
    let (a_correct, a_answers) = correctness_ratio(a);
    let (b_correct, b_answers) = correctness_ratio(b);
    (a_correct * b_answers).cmp(&(b_correct * a_answers))
}

/// The ratio as numerator and non-zero denominator.
fn correctness_ratio(word: &Word) -> (u64, u64) {
    match (u64::try_from(word.correct), u64::try_from(word.answers)) {
        (Ok(correct), Ok(answers)) if answers > 0 => (correct, answers),
        _ => (0, 1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    /// The word at this index is shown without its meaning.
    Presenting(usize),
    /// The meaning of the word at this index is shown.
    Revealed(usize),
    /// All words were shown.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    KnewIt,
    DidNotKnow,
}

/// The new counters of a word after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRecord {
    pub word_id: i64,
    pub answers: i32,
    pub correct: i32,
}

impl From<AnswerRecord> for UpdateWord {
    fn from(answer: AnswerRecord) -> Self {
        Self {
            word_id: answer.word_id,
            answers: Some(answer.answers),
            correct: Some(answer.correct),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QuizError {
    #[error("an answer can only be given while a word is presented, but the quiz is {state:?}")]
    NotPresenting { state: QuizState },

    #[error("the quiz can only advance after the meaning was revealed, but it is {state:?}")]
    NotRevealed { state: QuizState },
}

#[derive(Debug, Clone)]
pub struct Quiz {
    words: Vec<Word>,
    state: QuizState,
}

impl Quiz {
    /// Start a quiz over the given words.
    /// A quiz without words is exhausted right away.
    pub fn new(words: &[Word]) -> Self {
        let words = rank_words(words);
        let state = if words.is_empty() {
            QuizState::Exhausted
        } else {
            QuizState::Presenting(0)
        };
        Self { words, state }
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    /// The words in quiz order, with the counters updated by the answers given so far.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn current_word(&self) -> Option<&Word> {
        match self.state {
            QuizState::Presenting(index) | QuizState::Revealed(index) => self.words.get(index),
            QuizState::Exhausted => None,
        }
    }

    /// Record the answer to the presented word and reveal its meaning.
    pub fn mark(&mut self, outcome: Outcome) -> Result<AnswerRecord, QuizError> {
        let QuizState::Presenting(index) = self.state else {
            return Err(QuizError::NotPresenting { state: self.state });
        };
        let word = &mut self.words[index];

        word.answers = word.answers.saturating_add(1);
        if outcome == Outcome::KnewIt {
            word.correct = word.correct.saturating_add(1);
        }
        debug_assert!(word.correct <= word.answers);

        self.state = QuizState::Revealed(index);
        Ok(AnswerRecord {
            word_id: word.id,
            answers: word.answers,
            correct: word.correct,
        })
    }

    /// Move from a revealed word to the next one.
    pub fn advance(&mut self) -> Result<QuizState, QuizError> {
        let QuizState::Revealed(index) = self.state else {
            return Err(QuizError::NotRevealed { state: self.state });
        };

        self.state = if index + 1 < self.words.len() {
            QuizState::Presenting(index + 1)
        } else {
            QuizState::Exhausted
        };
        Ok(self.state)
    }
}
