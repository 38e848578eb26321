use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("conversation {0} not found")]
    ConversationNotFound(i64),

    #[error("contact {0} not found")]
    ContactNotFound(i64),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl HelpdeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HelpdeskError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            HelpdeskError::Http(_) => ErrorKind::Transient,
            HelpdeskError::UnexpectedStatus { status, .. } if *status == 429 => {
                ErrorKind::RateLimited
            }
            HelpdeskError::UnexpectedStatus { status, .. } if *status >= 500 => {
                ErrorKind::Transient
            }
            HelpdeskError::UnexpectedStatus { .. } => ErrorKind::Authoritative,
            HelpdeskError::ConversationNotFound(_) | HelpdeskError::ContactNotFound(_) => {
                ErrorKind::NotFound
            }
            HelpdeskError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, HelpdeskError>;
