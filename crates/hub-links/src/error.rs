use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::Database(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
