pub mod client;
pub mod error;
pub mod notifier;

pub use client::{ConversationStatus, HelpdeskClient};
pub use error::{HelpdeskError, Result};
pub use notifier::{NullNotifier, Notifier};
