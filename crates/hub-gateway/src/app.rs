use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hub_core::config::{AgentDirectory, HubConfig, PortalConfig, TransportKind};
use hub_crm::{Credential, CrmClient, OAuthRefreshConfig};
use hub_dealsync::DealSyncEngine;
use hub_helpdesk::{HelpdeskClient, Notifier};
use hub_links::LinkRegistry;
use hub_mutex::EventMutex;
use hub_pipeline::OutboundDispatcher;
use hub_routing::RoutingEngine;
use hub_transcribe::{HttpSttClient, TranscriptionWorker};
use hub_transports::{tg::TgClient, wa::WaClient, TransportClient};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::info;

use crate::agent_factory::ConfigRouterAgentFactory;
use crate::collaborators::{LlmSummarizer, SttVoiceTranscriber};
use crate::error::{GatewayError, Result};

/// Composition root: every subsystem client/engine behind one `Arc`,
/// built once at startup from `HubConfig` and handed to every handler
/// (spec §9's "global singletons" note, mirroring `skynet-gateway::app::AppState`).
pub struct AppState {
    pub config: HubConfig,
    pub conn: Arc<Mutex<Connection>>,
    pub directory: Arc<AgentDirectory>,
    pub crm_clients: HashMap<String, Arc<CrmClient>>,
    pub helpdesk: Arc<HelpdeskClient>,
    pub routing: Arc<RoutingEngine>,
    pub links: Arc<LinkRegistry>,
    pub mutex: Arc<EventMutex>,
    pub dealsync: Arc<DealSyncEngine>,
    pub transcribe: Arc<TranscriptionWorker>,
    pub agents: Arc<hub_agent::AgentOrchestrator>,
    pub outbound: Arc<OutboundDispatcher>,
    pub summarizer: Arc<LlmSummarizer>,
    pub voice: Arc<SttVoiceTranscriber>,
    pub transports: HashMap<i64, Arc<dyn TransportClient>>,
    pub wa_instance_to_inbox: HashMap<String, i64>,
    /// `transports` erases WA/TG behind `TransportClient` for uniform
    /// sending; inbound webhook decoding needs transport-specific shapes
    /// (GreenAPI's `downloadFile`, Wappi's `contact/get`), so the concrete
    /// clients are kept alongside it too.
    pub wa_clients: HashMap<i64, Arc<WaClient>>,
    pub tg_clients: HashMap<i64, Arc<TgClient>>,
}

impl AppState {
    pub fn build(config: HubConfig) -> anyhow::Result<(Arc<Self>, watch::Receiver<bool>)> {
        let conn = Connection::open(&config.database.path)?;
        hub_core::db::init_db(&conn)?;
        let conn = Arc::new(Mutex::new(conn));

        let directory = Arc::new(AgentDirectory::build(&config.agents));

        let mut crm_clients = HashMap::new();
        for portal in &config.crm.portals {
            crm_clients.insert(portal.domain.clone(), Arc::new(build_crm_client(portal, config.crm.timeout_ms)?));
        }

        let mutex = Arc::new(EventMutex::new(conn.clone()));
        let links = Arc::new(LinkRegistry::new(conn.clone()));

        let (notifier_tx, notifier) = build_notifier();
        let helpdesk = Arc::new(HelpdeskClient::new(
            config.helpdesk.host.clone(),
            config.helpdesk.api_token.clone(),
            config.helpdesk.account_id,
            config.helpdesk.timeout_ms,
            notifier,
        )?);

        let routing = Arc::new(RoutingEngine::new(conn.clone(), directory.clone()));
        routing.bootstrap_activation()?;

        let dealsync = Arc::new(DealSyncEngine::new(
            crm_clients.clone(),
            helpdesk.clone(),
            links.clone(),
            mutex.clone(),
            conn.clone(),
            directory.clone(),
        ));
        notifier_tx.bind(dealsync.clone());

        let stt_api_key = config.agents.first().map(|a| a.openai_token.clone()).unwrap_or_default();
        let stt: Arc<dyn hub_transcribe::SttClient> = Arc::new(HttpSttClient::new(
            "https://api.openai.com/v1/audio/transcriptions",
            stt_api_key,
            120_000,
        )?);
        let transcribe = Arc::new(TranscriptionWorker::new(
            crm_clients.clone(),
            helpdesk.clone(),
            links.clone(),
            stt.clone(),
            conn.clone(),
        ));

        let factory = Arc::new(ConfigRouterAgentFactory::new(
            directory.clone(),
            "gpt-4o-mini".to_string(),
            "gpt-4o-mini".to_string(),
        ));
        let agents = Arc::new(hub_agent::AgentOrchestrator::new(
            helpdesk.clone(),
            conn.clone(),
            factory,
            config.operators.ai_operator_chatwoot_ids.clone(),
        ));

        let mut transports: HashMap<i64, Arc<dyn TransportClient>> = HashMap::new();
        let mut wa_instance_to_inbox = HashMap::new();
        let mut wa_clients: HashMap<i64, Arc<WaClient>> = HashMap::new();
        let mut tg_clients: HashMap<i64, Arc<TgClient>> = HashMap::new();
        for agent in &config.agents {
            for transport in &agent.transports {
                let client: Arc<dyn TransportClient> = match transport.kind {
                    TransportKind::Wa => {
                        wa_instance_to_inbox.insert(transport.instance_id.clone(), transport.inbox_id);
                        let wa = Arc::new(WaClient::new(
                            "https://api.green-api.com",
                            transport.instance_id.clone(),
                            transport.api_token.clone(),
                        ));
                        wa_clients.insert(transport.inbox_id, wa.clone());
                        wa
                    }
                    TransportKind::Tg => {
                        let tg = Arc::new(TgClient::new(
                            "https://wappi.pro",
                            transport.instance_id.clone(),
                            transport.api_token.clone(),
                        ));
                        tg_clients.insert(transport.inbox_id, tg.clone());
                        tg
                    }
                };
                transports.insert(transport.inbox_id, client);
            }
        }

        let provider: Arc<dyn hub_agent::LlmProvider> = Arc::new(hub_agent::openai::OpenAiProvider::new(
            config.agents.first().map(|a| a.openai_token.clone()).unwrap_or_default(),
            None,
        ));
        let summarizer = Arc::new(LlmSummarizer::new(provider, "gpt-4o-mini".to_string()));
        let voice = Arc::new(SttVoiceTranscriber::new(stt));

        let outbound = Arc::new(OutboundDispatcher::new(
            helpdesk.clone(),
            transports.clone(),
            hub_pipeline::ContactCard {
                phone: "+70000000000".to_string(),
                first_name: "Менеджер".to_string(),
                last_name: None,
            },
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        ctrlc_to_shutdown(shutdown_tx);

        info!(agents = config.agents.len(), portals = config.crm.portals.len(), "composition root built");

        Ok((
            Arc::new(Self {
                config,
                conn,
                directory,
                crm_clients,
                helpdesk,
                routing,
                links,
                mutex,
                dealsync,
                transcribe,
                agents,
                outbound,
                summarizer,
                voice,
                transports,
                wa_instance_to_inbox,
                wa_clients,
                tg_clients,
            }),
            shutdown_rx,
        ))
    }

    pub fn crm(&self, portal: &str) -> Result<Arc<CrmClient>> {
        self.crm_clients
            .get(portal)
            .cloned()
            .ok_or_else(|| GatewayError::BadRequest(format!("unknown portal {portal}")))
    }
}

fn build_crm_client(portal: &PortalConfig, timeout_ms: u64) -> anyhow::Result<CrmClient> {
    let (base_url, credential, refresh_cfg) = if let Some(token) = &portal.webhook_token {
        (format!("https://{}/rest/{}", portal.domain, token), Credential::Webhook { token: token.clone() }, None)
    } else {
        let access_token = portal.oauth_access_token.clone().unwrap_or_default();
        let refresh_cfg = match (&portal.oauth_client_id, &portal.oauth_client_secret, &portal.oauth_refresh_token) {
            (Some(id), Some(secret), Some(refresh)) => Some(OAuthRefreshConfig {
                client_id: id.clone(),
                client_secret: secret.clone(),
                refresh_token: refresh.clone(),
                refresh_url: format!("https://{}/oauth/token/", portal.domain),
            }),
            _ => None,
        };
        (format!("https://{}/rest", portal.domain), Credential::OAuth { access_token }, refresh_cfg)
    };
    Ok(CrmClient::new(base_url, credential, timeout_ms, refresh_cfg)?)
}

/// `HelpdeskClient::new` takes the `Notifier` up front, but `DealSyncEngine`
/// (its only real implementation, see `hub_dealsync::engine`) needs
/// `Arc<HelpdeskClient>` — the cycle spec §9 flags. Broken with a
/// deferred-bind cell: calls made before `bind` silently no-op rather than
/// blocking startup on construction order.
fn build_notifier() -> (DeferredNotifierHandle, Arc<dyn hub_helpdesk::Notifier>) {
    let cell: Arc<tokio::sync::OnceCell<Arc<DealSyncEngine>>> = Arc::new(tokio::sync::OnceCell::new());
    let notifier = Arc::new(DeferredNotifier { cell: cell.clone() });
    (DeferredNotifierHandle { cell }, notifier)
}

struct DeferredNotifierHandle {
    cell: Arc<tokio::sync::OnceCell<Arc<DealSyncEngine>>>,
}

impl DeferredNotifierHandle {
    fn bind(self, dealsync: Arc<DealSyncEngine>) {
        let _ = self.cell.set(dealsync);
    }
}

struct DeferredNotifier {
    cell: Arc<tokio::sync::OnceCell<Arc<DealSyncEngine>>>,
}

#[async_trait::async_trait]
impl hub_helpdesk::Notifier for DeferredNotifier {
    async fn notify_responsible(&self, conversation_id: i64, marker: &str) {
        if let Some(dealsync) = self.cell.get() {
            dealsync.notify_responsible(conversation_id, marker).await;
        } else {
            tracing::warn!(conversation_id, marker, "NotifyResponsible fired before dealsync engine was bound");
        }
    }
}

/// Wires every handler onto its route (spec §6), mirroring
/// `skynet-gateway::app::build_router`'s `.with_state(...).layer(TraceLayer)` shape.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::{get, post};
    use crate::http;

    axum::Router::new()
        .route("/health", get(http::health::health_handler))
        .route("/webhook/v3/website", post(http::website::website_form))
        .route("/webhook/leadon/website", post(http::website::leadon_website))
        .route("/bx24/deal/update", post(http::bx24::deal_update))
        .route("/bx24/mbkchat/chat", post(http::bx24::mbkchat_chat))
        .route("/bx24/mbkchat/send_contact", post(http::bx24::send_contact))
        .route("/bx24/mbkchat/select_dialog", post(http::bx24::select_dialog))
        .route("/bx24/transport/leads", post(http::bx24::transport_leads))
        .route("/sdk_agent_webhook/{agent_code}", post(http::sdk_agent::sdk_agent_webhook))
        .route("/{agent_code}/{kind}/to/chatwoot/{inbox_id}", post(http::transport::inbound))
        .route("/{agent_code}/{kind}/from/chatwoot/{inbox_id}", post(http::transport::outbound))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn ctrlc_to_shutdown(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
}
