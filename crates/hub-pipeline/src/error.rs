use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Helpdesk(#[from] hub_helpdesk::HelpdeskError),

    #[error(transparent)]
    Transport(#[from] hub_transports::TransportError),

    #[error(transparent)]
    Routing(#[from] hub_routing::RoutingError),

    #[error("unroutable outbound message for conversation {0}: no inbox mapping")]
    NoInbox(i64),

    #[error("unroutable outbound message: no transport registered for inbox {0}")]
    NoTransport(i64),

    #[error("malformed manager-card payload: {0}")]
    MalformedManagerCard(String),

    #[error("enrichment failed: {0}")]
    Enrichment(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Http(_) => ErrorKind::Transient,
            PipelineError::Io(_) => ErrorKind::Internal,
            PipelineError::Helpdesk(e) => e.kind(),
            PipelineError::Transport(e) => e.kind(),
            PipelineError::Routing(e) => e.kind(),
            PipelineError::NoInbox(_) | PipelineError::NoTransport(_) => ErrorKind::Internal,
            PipelineError::MalformedManagerCard(_) => ErrorKind::Malformed,
            PipelineError::Enrichment(_) => ErrorKind::Transient,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
