pub mod batch;
pub mod client;
pub mod encode;
pub mod error;
pub mod retry;

pub use client::{CrmClient, Credential, OAuthRefreshConfig};
pub use error::{CrmError, Result};
