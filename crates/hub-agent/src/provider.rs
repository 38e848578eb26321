use async_trait::async_trait;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
}

/// Common interface over LLM backends (ported from the teacher's
/// `skynet-agent::provider::LlmProvider`, trimmed to what summarization
/// and routing need — no streaming, no tool-calling).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse>;
}

pub(crate) fn map_status_error(status: u16, message: String) -> AgentError {
    if status == 429 {
        AgentError::RateLimited { retry_after_ms: 5000 }
    } else {
        AgentError::ProviderApi { status, message }
    }
}
