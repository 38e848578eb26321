use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::types::MessageType;
use hub_helpdesk::HelpdeskClient;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::conversation_state;
use crate::error::Result;
use crate::history::build_history;
use crate::router::RouterAgent;
use crate::runner::{self, RunContext};
use crate::typing_delay::sleep_for_typing;

const ROUTER_CACHE_BOUND: usize = 32;

/// Minimal `message_created` webhook shape (spec §4.10, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageCreatedPayload {
    pub event: String,
    pub id: i64,
    pub message_type: String,
    #[serde(default)]
    pub private: bool,
    pub conversation: ConversationPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationPayload {
    pub id: i64,
    pub meta: ConversationMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationMeta {
    pub assignee: Option<Assignee>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignee {
    pub id: i64,
}

/// Builds a fresh `RouterAgent` for an agent code — supplied by the
/// composition root (`hub-gateway`), which knows per-agent OpenAI tokens
/// and prompt files.
#[async_trait]
pub trait RouterAgentFactory: Send + Sync {
    async fn build(&self, agent_code: &str) -> Result<RouterAgent>;
}

/// C11: the agent orchestrator. Holds a bounded cache of compiled router
/// agents keyed by `agent_code` (spec §5 "in-memory caches... bounded at
/// 32") and drives the inbound reply flow end to end.
pub struct AgentOrchestrator {
    helpdesk: Arc<HelpdeskClient>,
    conn: Arc<Mutex<Connection>>,
    factory: Arc<dyn RouterAgentFactory>,
    ai_operator_ids: Vec<i64>,
    cache: DashMap<String, Arc<RouterAgent>>,
}

impl AgentOrchestrator {
    pub fn new(
        helpdesk: Arc<HelpdeskClient>,
        conn: Arc<Mutex<Connection>>,
        factory: Arc<dyn RouterAgentFactory>,
        ai_operator_ids: Vec<i64>,
    ) -> Self {
        Self {
            helpdesk,
            conn,
            factory,
            ai_operator_ids,
            cache: DashMap::new(),
        }
    }

    async fn router_for(&self, agent_code: &str) -> Result<Arc<RouterAgent>> {
        if let Some(cached) = self.cache.get(agent_code) {
            return Ok(cached.clone());
        }
        let built = Arc::new(self.factory.build(agent_code).await?);
        if self.cache.len() >= ROUTER_CACHE_BOUND {
            if let Some(evict) = self.cache.iter().next().map(|e| e.key().clone()) {
                self.cache.remove(&evict);
            }
        }
        self.cache.insert(agent_code.to_string(), built.clone());
        Ok(built)
    }

    /// Full C11 inbound flow (spec §4.10).
    #[instrument(skip(self, payload), fields(agent_code = %agent_code, conversation_id = payload.conversation.id))]
    pub async fn handle_message_created(&self, agent_code: &str, payload: MessageCreatedPayload) -> Result<Option<String>> {
        if payload.event != "message_created" || payload.message_type == "outgoing" {
            return Ok(None);
        }
        let assignee_id = payload.conversation.meta.assignee.as_ref().map(|a| a.id);
        if !assignee_id.map(|id| self.ai_operator_ids.contains(&id)).unwrap_or(false) {
            return Ok(None);
        }

        let conversation_id = payload.conversation.id;
        {
            let guard = self.conn.lock().expect("agent db mutex poisoned");
            conversation_state::set_last_message_id(&guard, conversation_id, payload.id)?;
        }

        let messages = self.helpdesk.get_all_messages(conversation_id).await?;
        let history = build_history(&messages);

        let router = self.router_for(agent_code).await?;
        let started = Instant::now();
        let ctx = RunContext { agent_code, conversation_id };
        let result = runner::run(&router, &history, &ctx, 8).await?;
        let thinking = started.elapsed();

        sleep_for_typing(&result.final_output, thinking).await;

        let still_current = {
            let guard = self.conn.lock().expect("agent db mutex poisoned");
            conversation_state::get_last_message_id(&guard, conversation_id)?
        };
        if still_current != Some(payload.id) {
            warn!(
                agent_code = %agent_code,
                conversation_id,
                specialist = result.specialist,
                "dropping reply: a newer message arrived during generation"
            );
            return Ok(None);
        }

        self.helpdesk
            .send_message(conversation_id, &result.final_output, MessageType::Outgoing, false)
            .await?;
        info!(agent_code = %agent_code, conversation_id, specialist = result.specialist, "sent agent reply");
        Ok(Some(result.final_output))
    }
}
