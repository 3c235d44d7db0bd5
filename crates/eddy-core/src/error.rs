use thiserror::Error;

/// Failures surfaced to callers. Duplicate reports and duplicate
/// subscriptions never appear here: the store absorbs those and hands
/// back the existing record.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
