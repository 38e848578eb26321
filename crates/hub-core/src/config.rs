use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

pub const DEFAULT_DB_PATH: &str = "hub.sqlite3";
/// Literal operator ids from spec §6 (`AI_OPERATOR_CHATWOOT_IDS = {13, 14}`).
pub const DEFAULT_AI_OPERATOR_IDS: &[i64] = &[13, 14];
/// Notification recipients for `NotifyResponsible` (spec §4.7).
pub const DEFAULT_NOTIFY_USER_IDS: &[i64] = &[182, 6784, 6014];
pub const DEFAULT_CLIENT_MAX_SIZE_BYTES: usize = 30 * 1024 * 1024;

/// Top-level config (`hub.toml` + `HUB_*` env overrides), loaded once at
/// startup and held immutably behind `Arc` — spec §9's "Global singletons"
/// design note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub helpdesk: HelpdeskConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub ops_log: OpsLogConfig,
    #[serde(default)]
    pub operators: OperatorConfig,
}

impl HubConfig {
    /// Explicit path > `HUB_CONFIG` env > `./hub.toml`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let toml_path = path
            .map(str::to_string)
            .or_else(|| std::env::var("HUB_CONFIG").ok())
            .unwrap_or_else(|| "hub.toml".to_string());

        Figment::new()
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("HUB_").split("__"))
            .extract()
            .map_err(|e| HubError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpdeskConfig {
    pub host: String,
    pub api_token: String,
    pub account_id: i64,
    #[serde(default = "default_helpdesk_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_helpdesk_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub portals: Vec<PortalConfig>,
    #[serde(default = "default_crm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_crm_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// e.g. `forestvologda.bitrix24.ru`.
    pub domain: String,
    /// Webhook-style credential: token embedded in the call URL.
    pub webhook_token: Option<String>,
    /// OAuth credential pair, used when `webhook_token` is absent.
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
    pub oauth_access_token: Option<String>,
    pub oauth_refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_code: String,
    pub display_name: String,
    pub openai_token: String,
    #[serde(default)]
    pub prompt_path: Option<String>,
    pub transports: Vec<TransportConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Wa,
    Tg,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Wa => write!(f, "wa"),
            TransportKind::Tg => write!(f, "tg"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub instance_id: String,
    pub api_token: String,
    /// Globally unique; every transport maps 1:1 to a helpdesk inbox.
    pub inbox_id: i64,
    pub assignee_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    pub name: String,
    pub auth_mode: WebhookAuthMode,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WebhookAuthMode {
    HmacSha256,
    BearerToken,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpsLogConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_ai_operator_ids")]
    pub ai_operator_chatwoot_ids: Vec<i64>,
    #[serde(default = "default_notify_user_ids")]
    pub notify_user_ids: Vec<i64>,
    #[serde(default = "default_client_max_size")]
    pub client_max_size_bytes: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            ai_operator_chatwoot_ids: default_ai_operator_ids(),
            notify_user_ids: default_notify_user_ids(),
            client_max_size_bytes: default_client_max_size(),
        }
    }
}

fn default_ai_operator_ids() -> Vec<i64> {
    DEFAULT_AI_OPERATOR_IDS.to_vec()
}

fn default_notify_user_ids() -> Vec<i64> {
    DEFAULT_NOTIFY_USER_IDS.to_vec()
}

fn default_client_max_size() -> usize {
    DEFAULT_CLIENT_MAX_SIZE_BYTES
}

/// Read-only lookup tables derived from `HubConfig.agents` at startup —
/// spec §9's `AGENTS_BY_CODE` / `INBOX_TO_TRANSPORT` / `AGENT_TO_INBOX_IDS` /
/// `INBOX_TO_AGENT_CODE`, built once and never mutated.
pub struct AgentDirectory {
    agents_by_code: std::collections::HashMap<String, AgentConfig>,
    inbox_to_agent_code: std::collections::HashMap<i64, String>,
}

impl AgentDirectory {
    pub fn build(agents: &[AgentConfig]) -> Self {
        let mut agents_by_code = std::collections::HashMap::new();
        let mut inbox_to_agent_code = std::collections::HashMap::new();
        for agent in agents {
            for transport in &agent.transports {
                inbox_to_agent_code.insert(transport.inbox_id, agent.agent_code.clone());
            }
            agents_by_code.insert(agent.agent_code.clone(), agent.clone());
        }
        Self {
            agents_by_code,
            inbox_to_agent_code,
        }
    }

    pub fn agent(&self, agent_code: &str) -> Option<&AgentConfig> {
        self.agents_by_code.get(agent_code)
    }

    pub fn agent_code_for_inbox(&self, inbox_id: i64) -> Option<&str> {
        self.inbox_to_agent_code.get(&inbox_id).map(|s| s.as_str())
    }

    pub fn transport_for_inbox(&self, inbox_id: i64) -> Option<&TransportConfig> {
        let agent_code = self.agent_code_for_inbox(inbox_id)?;
        self.agents_by_code
            .get(agent_code)?
            .transports
            .iter()
            .find(|t| t.inbox_id == inbox_id)
    }

    /// Active candidate transports for `(agent_code, kind)`, in configured order.
    pub fn transports_for(&self, agent_code: &str, kind: TransportKind) -> Vec<&TransportConfig> {
        self.agents_by_code
            .get(agent_code)
            .map(|a| a.transports.iter().filter(|t| t.kind == kind).collect())
            .unwrap_or_default()
    }

    /// Every transport across every agent, for startup bootstrap passes.
    pub fn all_transports(&self) -> Vec<&TransportConfig> {
        self.agents_by_code
            .values()
            .flat_map(|a| a.transports.iter())
            .collect()
    }
}
