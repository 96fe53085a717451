use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StudyError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StudyError::InvalidInput(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        StudyError::NotFound(what.into())
    }
}

pub type Result<T> = std::result::Result<T, StudyError>;
