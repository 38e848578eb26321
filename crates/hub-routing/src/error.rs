use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no valid transport for agent={agent_code} kind={kind}")]
    NoValidTransport { agent_code: String, kind: String },

    #[error("advisory lock contention exhausted for key {0}")]
    LockTimeout(i64),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl RoutingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::NoValidTransport { .. } => ErrorKind::NotFound,
            RoutingError::LockTimeout(_) => ErrorKind::ContentionTimeout,
            RoutingError::Database(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, RoutingError>;
