//! OpenAI-compatible chat completions, ported from the teacher's
//! `skynet-agent::openai::OpenAiProvider` and trimmed to non-streaming,
//! non-tool-calling use (spec §4.10/§12).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::provider::{map_status_error, ChatRequest, ChatResponse, LlmProvider};

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let mut messages = vec![serde_json::json!({"role": "system", "content": req.system})];
        for m in &req.messages {
            let role = match m.role {
                crate::provider::Role::User => "user",
                crate::provider::Role::Assistant => "assistant",
                crate::provider::Role::System => "system",
            };
            messages.push(serde_json::json!({"role": role, "content": m.content}));
        }
        let body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "max_tokens": req.max_tokens,
        });

        debug!(model = %req.model, "sending request to OpenAI");
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
            return Err(map_status_error(status, text));
        }

        let parsed: ApiResponse = resp.json().await.map_err(|e| crate::error::AgentError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(ChatResponse { content })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
