use hub_core::ErrorKind;
use thiserror::Error;

/// CRM-specific error taxonomy (spec §4.1, §7).
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("gateway forbidden (403, nginx)")]
    GatewayBlocked,

    #[error("server error (literal 500 body)")]
    ServerError,

    #[error("rate limited, retry budget exhausted")]
    RateLimitExhausted,

    #[error("access token expired")]
    ExpiredToken,

    #[error("api error: status={status} body={body}")]
    Api { status: u16, body: String },

    #[error("token refresh failed: {0:?}")]
    RefreshFailed(RefreshErrorCode),

    #[error("batch call failed: {0}")]
    BatchError(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshErrorCode {
    InvalidGrant,
    WrongClient,
    ExpiredToken,
    NotInstalled,
    PaymentRequired,
    Other,
}

impl RefreshErrorCode {
    pub fn from_body(code: &str) -> Self {
        match code {
            "invalid_grant" => Self::InvalidGrant,
            "wrong_client" => Self::WrongClient,
            "expired_token" => Self::ExpiredToken,
            "not_installed" | "NOT_INSTALLED" => Self::NotInstalled,
            "payment_required" | "PAYMENT_REQUIRED" => Self::PaymentRequired,
            _ => Self::Other,
        }
    }
}

impl CrmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::Connection(_) => ErrorKind::Transient,
            CrmError::Timeout => ErrorKind::Timeout,
            CrmError::GatewayBlocked => ErrorKind::GatewayBlocked,
            CrmError::ServerError => ErrorKind::Authoritative,
            CrmError::RateLimitExhausted => ErrorKind::RateLimited,
            CrmError::ExpiredToken => ErrorKind::Expired,
            CrmError::Api { .. } => ErrorKind::Authoritative,
            CrmError::RefreshFailed(_) => ErrorKind::Authoritative,
            CrmError::BatchError(_) => ErrorKind::Authoritative,
            CrmError::Malformed(_) => ErrorKind::Malformed,
            CrmError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            CrmError::Http(_) => ErrorKind::Transient,
            CrmError::Serialization(_) => ErrorKind::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, CrmError>;
