use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{AgentError, Result};
use crate::provider::{ChatRequest, LlmProvider, Message, Role};
use crate::specialist::SpecialistAgent;

const ROUTER_SYSTEM_PROMPT: &str = "\
Ты — маршрутизатор обращений в строительную компанию. По истории диалога \
выбери ОДНОГО специалиста, который должен ответить. Ответь строго одним \
словом — кодом специалиста из списка, без пояснений.";

/// Per-agent cached router (spec §4.10, §12): one `LlmProvider` call picks
/// a specialist index, that specialist's own `LlmProvider::send` produces
/// `final_output`. Generalizes the teacher's `skynet-agent::router`
/// provider-failover idiom into a handoff decision instead.
pub struct RouterAgent {
    pub agent_code: String,
    pub router_model: String,
    pub router_provider: Arc<dyn LlmProvider>,
    pub specialists: Vec<SpecialistAgent>,
}

impl RouterAgent {
    #[instrument(skip(self, history), fields(agent_code = %self.agent_code))]
    pub async fn route(&self, history: &[Message]) -> Result<&SpecialistAgent> {
        if self.specialists.is_empty() {
            return Err(AgentError::NoSpecialists(self.agent_code.clone()));
        }
        let labels: Vec<&str> = self.specialists.iter().map(|s| s.kind.label()).collect();
        let prompt = format!(
            "Доступные специалисты: {}.\n\nНазови код специалиста для последнего сообщения клиента.",
            labels.join(", ")
        );
        let mut messages = history.to_vec();
        messages.push(Message { role: Role::User, content: prompt });

        let req = ChatRequest {
            model: self.router_model.clone(),
            system: ROUTER_SYSTEM_PROMPT.to_string(),
            messages,
            max_tokens: 16,
        };
        let resp = self.router_provider.send(&req).await?;
        let choice = resp.content.trim().to_lowercase();

        let picked = self
            .specialists
            .iter()
            .find(|s| choice.contains(s.kind.label()))
            .or_else(|| self.specialists.first());

        match picked {
            Some(s) => {
                info!(agent_code = %self.agent_code, specialist = s.kind.label(), "routed to specialist");
                Ok(s)
            }
            None => {
                warn!(agent_code = %self.agent_code, raw = %resp.content, "router produced no usable choice");
                Err(AgentError::NoRoute)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as AgentResult;
    use crate::provider::ChatResponse;
    use crate::specialist::SpecialistKind;
    use async_trait::async_trait;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, _req: &ChatRequest) -> AgentResult<ChatResponse> {
            Ok(ChatResponse { content: self.0.to_string() })
        }
    }

    fn specialist(kind: SpecialistKind) -> SpecialistAgent {
        SpecialistAgent {
            kind,
            system_prompt: "test".to_string(),
            model: "test-model".to_string(),
            provider: Arc::new(FixedProvider("ok")),
        }
    }

    #[tokio::test]
    async fn routes_to_matching_label() {
        let router = RouterAgent {
            agent_code: "maksim".to_string(),
            router_model: "test-model".to_string(),
            router_provider: Arc::new(FixedProvider("mortgage")),
            specialists: vec![specialist(SpecialistKind::General), specialist(SpecialistKind::Mortgage)],
        };
        let picked = router.route(&[]).await.unwrap();
        assert_eq!(picked.kind, SpecialistKind::Mortgage);
    }

    #[tokio::test]
    async fn falls_back_to_first_specialist_on_unrecognized_choice() {
        let router = RouterAgent {
            agent_code: "maksim".to_string(),
            router_model: "test-model".to_string(),
            router_provider: Arc::new(FixedProvider("не знаю")),
            specialists: vec![specialist(SpecialistKind::General), specialist(SpecialistKind::Mortgage)],
        };
        let picked = router.route(&[]).await.unwrap();
        assert_eq!(picked.kind, SpecialistKind::General);
    }
}
