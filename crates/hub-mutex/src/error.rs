use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutexError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl MutexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutexError::Database(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, MutexError>;
