//! Error taxonomy for validation, backend access and submission.

use crate::models::Category;
use thiserror::Error;

/// A draft was rejected before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please provide a comment")]
    EmptyComment,

    #[error("Missing rating for {0}")]
    MissingRating(Category),

    #[error("{category} rating must be between 1 and 5 (got {value})")]
    RatingOutOfRange { category: Category, value: i64 },
}

/// Failure talking to the hosted backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Cannot connect to backend at {0}")]
    Connect(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Backend API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Not authorized; sign in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend misconfigured: {0}")]
    Config(String),
}

/// Why a review submission ended in `Failed`.
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("You need to be signed in to submit a review")]
    AuthenticationRequired,

    #[error("Failed to save review: {0}")]
    Persistence(#[source] BackendError),
}

impl SubmissionError {
    /// Only persistence failures are worth a manual retry with the same draft.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmissionError::Persistence(_))
    }
}

impl From<BackendError> for SubmissionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unauthorized => SubmissionError::AuthenticationRequired,
            other => SubmissionError::Persistence(other),
        }
    }
}
