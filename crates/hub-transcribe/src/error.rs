use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stt request failed with status {0}")]
    SttStatus(u16),

    #[error("no file id on call {0}")]
    NoFileId(String),

    #[error("empty recording for call {0}")]
    EmptyRecording(String),

    #[error(transparent)]
    Crm(#[from] hub_crm::CrmError),

    #[error(transparent)]
    Helpdesk(#[from] hub_helpdesk::HelpdeskError),

    #[error(transparent)]
    Link(#[from] hub_links::LinkError),

    #[error(transparent)]
    DealSync(#[from] hub_dealsync::DealSyncError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TranscribeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::Http(_) | TranscribeError::SttStatus(_) => ErrorKind::Transient,
            TranscribeError::NoFileId(_) | TranscribeError::EmptyRecording(_) => ErrorKind::Malformed,
            TranscribeError::Crm(e) => e.kind(),
            TranscribeError::Helpdesk(e) => e.kind(),
            TranscribeError::Link(e) => e.kind(),
            TranscribeError::DealSync(e) => e.kind(),
            TranscribeError::Database(_) | TranscribeError::Io(_) => ErrorKind::Internal,
            TranscribeError::Malformed(_) => ErrorKind::Malformed,
        }
    }
}

pub type Result<T> = std::result::Result<T, TranscribeError>;
