use std::sync::Arc;

use async_trait::async_trait;
use hub_agent::{AgentError, LlmProvider, Result, RouterAgent, RouterAgentFactory, SpecialistAgent, SpecialistKind};
use hub_agent::openai::OpenAiProvider;
use hub_core::config::AgentDirectory;
use tracing::instrument;

/// Builds a `RouterAgent` per agent code from `HubConfig.agents` (spec
/// §4.10, §12): one `OpenAiProvider` per agent (its own `openai_token`),
/// shared across the router call and every specialist, each specialist
/// distinguished only by its system prompt.
pub struct ConfigRouterAgentFactory {
    directory: Arc<AgentDirectory>,
    router_model: String,
    specialist_model: String,
}

impl ConfigRouterAgentFactory {
    pub fn new(directory: Arc<AgentDirectory>, router_model: String, specialist_model: String) -> Self {
        Self {
            directory,
            router_model,
            specialist_model,
        }
    }
}

#[async_trait]
impl RouterAgentFactory for ConfigRouterAgentFactory {
    #[instrument(skip(self))]
    async fn build(&self, agent_code: &str) -> Result<RouterAgent> {
        let agent = self
            .directory
            .agent(agent_code)
            .ok_or_else(|| AgentError::NoSpecialists(agent_code.to_string()))?;

        let base_prompt = match &agent.prompt_path {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .unwrap_or_else(|_| default_prompt(&agent.display_name)),
            None => default_prompt(&agent.display_name),
        };

        let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::new(agent.openai_token.clone(), None));

        let specialists = SpecialistKind::ALL
            .iter()
            .map(|&kind| SpecialistAgent {
                kind,
                system_prompt: format!("{base_prompt}\n\nТвоя роль: {}.", kind.label()),
                model: self.specialist_model.clone(),
                provider: provider.clone(),
            })
            .collect();

        Ok(RouterAgent {
            agent_code: agent_code.to_string(),
            router_model: self.router_model.clone(),
            router_provider: provider,
            specialists,
        })
    }
}

fn default_prompt(display_name: &str) -> String {
    format!("Ты — ассистент отдела продаж компании «{display_name}». Отвечай кратко и по делу.")
}
