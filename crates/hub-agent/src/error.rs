use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider api error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    #[error("provider rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider response parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Helpdesk(#[from] hub_helpdesk::HelpdeskError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("router returned no usable specialist index")]
    NoRoute,

    #[error("conversation {0} has no configured specialists")]
    NoSpecialists(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Http(_) | AgentError::RateLimited { .. } => ErrorKind::Transient,
            AgentError::ProviderApi { status, .. } if (500..600).contains(status) => ErrorKind::Transient,
            AgentError::ProviderApi { .. } => ErrorKind::Authoritative,
            AgentError::Parse(_) => ErrorKind::Malformed,
            AgentError::Helpdesk(e) => e.kind(),
            AgentError::Database(_) => ErrorKind::Internal,
            AgentError::NoRoute | AgentError::NoSpecialists(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
