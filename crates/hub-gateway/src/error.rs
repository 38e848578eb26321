use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hub_core::ErrorKind;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Top-level error type for HTTP handlers. Every subsystem error converts
/// in via `#[from]`; `.kind()` delegates to the subsystem's own taxonomy
/// (spec §7) so the status-code mapping lives in exactly one place.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Crm(#[from] hub_crm::CrmError),
    #[error(transparent)]
    Helpdesk(#[from] hub_helpdesk::HelpdeskError),
    #[error(transparent)]
    Transport(#[from] hub_transports::TransportError),
    #[error(transparent)]
    Routing(#[from] hub_routing::RoutingError),
    #[error(transparent)]
    Link(#[from] hub_links::LinkError),
    #[error(transparent)]
    Mutex(#[from] hub_mutex::MutexError),
    #[error(transparent)]
    DealSync(#[from] hub_dealsync::DealSyncError),
    #[error(transparent)]
    Transcribe(#[from] hub_transcribe::TranscribeError),
    #[error(transparent)]
    Pipeline(#[from] hub_pipeline::PipelineError),
    #[error(transparent)]
    Agent(#[from] hub_agent::AgentError),
    #[error(transparent)]
    Hub(#[from] hub_core::HubError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Crm(e) => e.kind(),
            GatewayError::Helpdesk(e) => e.kind(),
            GatewayError::Transport(e) => e.kind(),
            GatewayError::Routing(e) => e.kind(),
            GatewayError::Link(e) => e.kind(),
            GatewayError::Mutex(e) => e.kind(),
            GatewayError::DealSync(e) => e.kind(),
            GatewayError::Transcribe(e) => e.kind(),
            GatewayError::Pipeline(e) => e.kind(),
            GatewayError::Agent(e) => e.kind(),
            GatewayError::Hub(e) => e.kind(),
            GatewayError::BadRequest(_) => ErrorKind::Malformed,
        }
    }
}

/// Spec §7's "one place to decide the HTTP response": every webhook
/// endpoint answers with the status this table picks, regardless of
/// which subsystem the error came from.
fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Transient | ErrorKind::Timeout | ErrorKind::ContentionTimeout => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Authoritative => StatusCode::BAD_GATEWAY,
        ErrorKind::Expired | ErrorKind::GatewayBlocked => StatusCode::BAD_GATEWAY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Malformed => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(self.kind());
        warn!(error = %self, status = %status, "request failed");
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
