use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("async task timed out after {0}s")]
    TaskTimeout(u64),

    #[error("async task failed with status {0}")]
    TaskFailed(String),

    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            TransportError::Http(_) => ErrorKind::Transient,
            TransportError::UnexpectedStatus { status, .. } if *status >= 500 => {
                ErrorKind::Transient
            }
            TransportError::UnexpectedStatus { .. } => ErrorKind::Authoritative,
            TransportError::TaskTimeout(_) => ErrorKind::Timeout,
            TransportError::TaskFailed(_) => ErrorKind::Authoritative,
            TransportError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
