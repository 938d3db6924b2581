use anstoss_core::StoreError;
use thiserror::Error;

/// Request fields that fail validation. Nothing has been persisted when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rating must be 1-5, got {0}")]
    InvalidRating(i64),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("malformed request: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
