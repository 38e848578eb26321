use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use hub_core::config::TransportKind;
use hub_core::normalize::{helpdesk_identifier, normalize_phone};
use hub_core::types::MessageType;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct WebsiteFormPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub comment: String,
    pub phone: String,
    pub agent_name: String,
    #[serde(default)]
    pub contact_method: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub form_data: Option<Value>,
}

/// `POST /webhook/v3/website` — generic site-form ingest (spec §6), grounded
/// on `original_source/company_websites/handlers/handle_form_website_webhook.py`.
pub async fn website_form(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebsiteFormPayload>,
) -> (StatusCode, Json<Value>) {
    if payload.agent_name.is_empty() || payload.phone.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "agent_name and phone are required"})));
    }

    let kind = match payload.contact_method.as_deref().map(str::to_lowercase).as_deref() {
        Some("telegram") => TransportKind::Tg,
        _ => TransportKind::Wa,
    };
    let name = payload
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Заявка с сайта! {}", payload.phone));
    let message = if payload.comment.is_empty() { payload.title.clone() } else { payload.comment.clone() };

    match seed_conversation(&state, &payload.agent_name, kind, &payload.phone, &name, &message).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            warn!(error = %e, agent_name = %payload.agent_name, "website form ingest failed");
            // Webhook ingress: the source retries on non-200, so a processing
            // failure here still answers 200 (spec §7/§9's webhook policy).
            (StatusCode::OK, Json(json!({"status": "error"})))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LeadOnSitePayload {
    pub phone: String,
    pub agent_name: String,
}

/// `POST /webhook/leadon/website` — minimal LEADON site lead, grounded on
/// `original_source/company_websites/handlers/handle_lead_on_site.py`.
pub async fn leadon_website(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LeadOnSitePayload>,
) -> (StatusCode, Json<Value>) {
    if payload.agent_name.is_empty() || payload.phone.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "insufficient data"})));
    }
    let phone = normalize_phone(&payload.phone);
    let name = format!("LEADON {phone}");
    let message = "Здравствуйте, правильно понимаю, что хотели бы получить каталог проектов?".to_string();

    match seed_conversation(&state, &payload.agent_name, TransportKind::Wa, &phone, &name, &message).await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => {
            warn!(error = %e, agent_name = %payload.agent_name, "leadon ingest failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": "error", "message": e.to_string()})))
        }
    }
}

/// Picks a transport (C4), then gets or creates a helpdesk contact and
/// conversation and posts the opening message — the `safe_send_to_chatwoot`
/// shape from `original_source/chatwoot_api`.
async fn seed_conversation(
    state: &AppState,
    agent_code: &str,
    kind: TransportKind,
    phone: &str,
    name: &str,
    message: &str,
) -> Result<()> {
    let phone = normalize_phone(phone);
    let inbox_id = state.routing.pick_transport(agent_code, kind, &phone).await?;

    let identifier = helpdesk_identifier(&phone);
    let (contact_id, _created) = state.helpdesk.get_or_create_contact(name, &identifier, Some(&phone)).await?;
    let assignee_id = state.directory.transport_for_inbox(inbox_id).and_then(|t| t.assignee_id);
    let (conversation_id, _created) = state
        .helpdesk
        .get_or_create_conversation(contact_id, inbox_id, None, assignee_id)
        .await?;
    state.helpdesk.send_message(conversation_id, message, MessageType::Outgoing, false).await?;
    info!(agent_code, inbox_id, conversation_id, "seeded conversation from web lead");
    Ok(())
}
