pub mod activation;
pub mod error;
pub mod inbound;
pub mod outbound;

pub use activation::{handle_state_instance_changed, InboxResolver, StateInstanceChangedPayload};
pub use error::{PipelineError, Result};
pub use inbound::{enrich, CanonicalMessage, DocumentSummarizer, ImageSummarizer, InboundMedia, VoiceTranscriber};
pub use outbound::{ContactCard, OutboundDispatcher, MANAGER_CONTACT_MARKER};
