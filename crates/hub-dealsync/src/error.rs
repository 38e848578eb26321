use hub_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DealSyncError {
    #[error("deal not found: portal={portal} deal_id={deal_id}")]
    DealNotFound { portal: String, deal_id: i64 },

    #[error("no CRM client configured for portal {0}")]
    UnknownPortal(String),

    #[error("deal has no linked contact: portal={portal} deal_id={deal_id}")]
    NoContact { portal: String, deal_id: i64 },

    #[error("malformed CRM response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Crm(#[from] hub_crm::CrmError),

    #[error(transparent)]
    Helpdesk(#[from] hub_helpdesk::HelpdeskError),

    #[error(transparent)]
    Link(#[from] hub_links::LinkError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl DealSyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DealSyncError::DealNotFound { .. } | DealSyncError::NoContact { .. } => ErrorKind::NotFound,
            DealSyncError::UnknownPortal(_) => ErrorKind::Malformed,
            DealSyncError::Malformed(_) => ErrorKind::Malformed,
            DealSyncError::Crm(e) => e.kind(),
            DealSyncError::Helpdesk(e) => e.kind(),
            DealSyncError::Link(e) => e.kind(),
            DealSyncError::Database(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, DealSyncError>;
