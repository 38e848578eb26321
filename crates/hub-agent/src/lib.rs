pub mod conversation_state;
pub mod error;
pub mod history;
pub mod openai;
pub mod orchestrator;
pub mod provider;
pub mod router;
pub mod runner;
pub mod specialist;
pub mod typing_delay;

pub use error::{AgentError, Result};
pub use orchestrator::{AgentOrchestrator, MessageCreatedPayload, RouterAgentFactory};
pub use provider::LlmProvider;
pub use router::RouterAgent;
pub use specialist::{SpecialistAgent, SpecialistKind};
