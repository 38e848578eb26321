use thiserror::Error;

/// Cross-cutting error taxonomy shared by every subsystem crate (spec §7).
///
/// Each crate's own error enum maps into one of these via `.kind()`, giving
/// `hub-gateway` handlers one place to decide the HTTP response instead of
/// matching every concrete variant from every crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    RateLimited,
    Authoritative,
    Expired,
    NotFound,
    Malformed,
    GatewayBlocked,
    Timeout,
    ContentionTimeout,
    Internal,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::Config(_) => ErrorKind::Internal,
            HubError::Database(_) => ErrorKind::Internal,
            HubError::Serialization(_) => ErrorKind::Malformed,
            HubError::Io(_) => ErrorKind::Transient,
            HubError::NotFound(_) => ErrorKind::NotFound,
            HubError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Short error code, mirrors the teacher's `SkynetError::code()`.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Config(_) => "CONFIG_ERROR",
            HubError::Database(_) => "DATABASE_ERROR",
            HubError::Serialization(_) => "SERIALIZATION_ERROR",
            HubError::Io(_) => "IO_ERROR",
            HubError::NotFound(_) => "NOT_FOUND",
            HubError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
