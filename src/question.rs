//! Question model and the external question source
//!
//! Questions are authored outside this crate. The engine only consumes them:
//! the host (through the embedding server) fetches a filtered set from a
//! [`QuestionSource`] while setting the room up, and passes the final list
//! into the start message. Nothing on the round-critical path touches the
//! source again.

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One quiz question as presented to a room
///
/// The reference answer is never sent to players while a round is open; it
/// is shown to the host during evaluation and to voters in community mode.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Question {
    /// The prompt shown to everyone when the round starts
    #[garde(length(min = 1, max = crate::constants::question::MAX_PROMPT_LENGTH))]
    pub prompt: String,
    /// Expected answer, for the evaluating side only
    #[garde(inner(length(max = crate::constants::question::MAX_REFERENCE_LENGTH)))]
    pub reference_answer: Option<String>,
    /// Subject tag, e.g. "history"
    #[garde(inner(length(max = crate::constants::question::MAX_TAG_LENGTH)))]
    pub subject: Option<String>,
    /// Grade/level tag
    #[garde(inner(length(max = crate::constants::question::MAX_TAG_LENGTH)))]
    pub grade: Option<String>,
    /// Language tag
    #[garde(inner(length(max = crate::constants::question::MAX_TAG_LENGTH)))]
    pub language: Option<String>,
}

/// Filter for fetching questions from a source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionFilter {
    /// Only questions with this subject tag
    pub subject: Option<String>,
    /// Only questions with this grade tag
    pub grade: Option<String>,
    /// Only questions with this language tag
    pub language: Option<String>,
    /// Upper bound on the number of questions returned
    pub limit: Option<usize>,
}

/// Errors reported by a question source
#[derive(Error, Debug, Clone, Serialize)]
pub enum Error {
    /// The source could not be reached or answered with a failure
    #[error("question source unavailable: {0}")]
    Unavailable(String),
}

/// A read-only provider of quiz questions
///
/// Implemented by the embedding server over whatever storage it has. Only
/// consulted during room setup, never during gameplay.
pub trait QuestionSource {
    /// Fetches questions matching the filter
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the backing store cannot serve
    /// the request.
    fn fetch_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, Error>;

    /// Lists the subject tags the source knows about
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the backing store cannot serve
    /// the request.
    fn subjects(&self) -> Result<Vec<String>, Error>;

    /// Lists the language tags the source knows about
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the backing store cannot serve
    /// the request.
    fn languages(&self) -> Result<Vec<String>, Error>;
}

/// An in-memory question source, used in tests and simple embeddings
#[derive(Debug, Default, Clone)]
pub struct InMemorySource {
    questions: Vec<Question>,
}

impl InMemorySource {
    /// Creates a source serving the given questions
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }
}

impl QuestionSource for InMemorySource {
    fn fetch_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, Error> {
        let matches = |q: &&Question| {
            let tag_matches = |want: &Option<String>, have: &Option<String>| match want {
                Some(w) => have.as_deref() == Some(w.as_str()),
                None => true,
            };
            tag_matches(&filter.subject, &q.subject)
                && tag_matches(&filter.grade, &q.grade)
                && tag_matches(&filter.language, &q.language)
        };

        Ok(self
            .questions
            .iter()
            .filter(matches)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn subjects(&self) -> Result<Vec<String>, Error> {
        let mut subjects: Vec<String> = self
            .questions
            .iter()
            .filter_map(|q| q.subject.clone())
            .collect();
        subjects.sort();
        subjects.dedup();
        Ok(subjects)
    }

    fn languages(&self) -> Result<Vec<String>, Error> {
        let mut languages: Vec<String> = self
            .questions
            .iter()
            .filter_map(|q| q.language.clone())
            .collect();
        languages.sort();
        languages.dedup();
        Ok(languages)
    }
}
