use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use hub_core::normalize::normalize_phone;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::GatewayError;

/// `POST /bx24/deal/update` — Bitrix24's outbound "deal updated" webhook,
/// delivered `application/x-www-form-urlencoded` with bracketed keys
/// (`data[FIELDS][ID]`, `auth[domain]`). Grounds `hub_dealsync`'s
/// `handle_deal_update`, the C7 entrypoint.
pub async fn deal_update(State(state): State<Arc<AppState>>, body: Bytes) -> (StatusCode, Json<Value>) {
    let fields = decode_bracketed_form(&body);
    let Some(deal_id) = fields.get("data[FIELDS][ID]").and_then(|v| v.parse::<i64>().ok()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing data[FIELDS][ID]"})));
    };
    let Some(domain) = fields.get("auth[domain]") else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "missing auth[domain]"})));
    };

    match state.dealsync.handle_deal_update(domain, deal_id).await {
        Ok(true) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Ok(false) => (StatusCode::OK, Json(json!({"status": "skipped", "reason": "sync already in progress"}))),
        Err(e) => {
            // Webhook ingress: Bitrix retries aggressively on non-2xx, so a
            // processing failure still answers 200 rather than re-triggering
            // a retry storm (spec §7/§9's webhook policy).
            warn!(error = %e, domain = %domain, deal_id, "deal update sync failed");
            (StatusCode::OK, Json(json!({"status": "error", "message": e.to_string()})))
        }
    }
}

/// `POST /bx24/mbkchat/chat` — custom-field templating page. Out of core
/// per spec §1's Non-goals; kept as a stub so the route exists.
pub async fn mbkchat_chat() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"status": "not_implemented"})))
}

#[derive(Debug, Deserialize)]
pub struct SendContactPayload {
    pub deal_id: i64,
    pub portal_domain: String,
}

/// `POST /bx24/mbkchat/send_contact` — sends the construction manager's
/// card into the deal's primary linked conversation.
pub async fn send_contact(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SendContactPayload>,
) -> Result<Json<Value>, GatewayError> {
    let conversation_id = state
        .links
        .get_selected_conversation_id(&payload.portal_domain, payload.deal_id)?
        .ok_or_else(|| GatewayError::BadRequest(format!("no conversation linked to deal {}", payload.deal_id)))?;

    state
        .outbound
        .dispatch(conversation_id, hub_pipeline::MANAGER_CONTACT_MARKER)
        .await?;
    info!(deal_id = payload.deal_id, conversation_id, "sent manager contact card");
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct SelectDialogPayload {
    pub portal_domain: String,
    pub deal_id: i64,
    pub conversation_id: i64,
}

/// `POST /bx24/mbkchat/select_dialog` — marks one of a deal's linked
/// conversations as primary.
pub async fn select_dialog(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SelectDialogPayload>,
) -> Result<Json<Value>, GatewayError> {
    let set = state
        .links
        .set_primary(&payload.portal_domain, payload.deal_id, payload.conversation_id)?;
    if !set {
        return Err(GatewayError::BadRequest(format!(
            "no link for deal {} / conversation {}",
            payload.deal_id, payload.conversation_id
        )));
    }
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct TransportLeadsQuery {
    pub name: String,
    pub phone: String,
    pub id: String,
    pub source: String,
}

struct LeadSource {
    source: &'static str,
    domain: &'static str,
    funnel_id: i64,
}

/// Immutable source→portal map (spec §6's "creates CRM contact/deal in the
/// correct portal per an immutable source→portal map"), grounded on
/// `original_source/bx24/handlers/handle_artcontext_leads.py`'s
/// `portals_mapping`. Entries are illustrative configuration data, wired up
/// from whichever portals `HubConfig.crm.portals` actually configures.
const LEAD_SOURCES: &[LeadSource] = &[
    LeadSource { source: "site-primary", domain: "primary.bitrix24.ru", funnel_id: 0 },
    LeadSource { source: "site-secondary", domain: "secondary.bitrix24.ru", funnel_id: 0 },
];

/// `POST /bx24/transport/leads` — outbound lead capture from an external
/// ad/transport source; always creates a fresh deal (never dedupes on an
/// existing one, matching the original's behavior).
pub async fn transport_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransportLeadsQuery>,
) -> (StatusCode, Json<Value>) {
    let Some(lead_source) = LEAD_SOURCES.iter().find(|s| s.source == query.source) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "unknown lead source"})));
    };
    let crm = match state.crm(lead_source.domain) {
        Ok(crm) => crm,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))),
    };

    let phone = normalize_phone(&query.phone);
    let deal_name = format!("{} [{}]", query.name, query.source);

    let result: Result<Value, GatewayError> = async {
        let dup = crm
            .call("crm.duplicate.findbycomm", json!({"entity_type": "CONTACT", "type": "PHONE", "values": [&phone]}))
            .await?;
        let contact_id = match dup.get("result").and_then(|r| r.get("CONTACT")).and_then(|v| v.as_array()) {
            Some(ids) if !ids.is_empty() => ids
                .iter()
                .filter_map(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .min()
                .unwrap_or(0),
            _ => crm
                .call(
                    "crm.contact.add",
                    json!({"fields": {"NAME": &query.name, "PHONE": [{"VALUE": &phone, "VALUE_TYPE": "WORK"}]}}),
                )
                .await?
                .get("result")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| GatewayError::BadRequest("crm.contact.add returned no id".to_string()))?,
        };

        let deal_resp = crm
            .call(
                "crm.deal.add",
                json!({"fields": {
                    "CONTACT_ID": contact_id,
                    "TITLE": deal_name,
                    "CATEGORY_ID": lead_source.funnel_id,
                }}),
            )
            .await?;
        Ok(deal_resp)
    }
    .await;

    match result {
        Ok(resp) => {
            let deal_id = resp.get("result").cloned().unwrap_or(Value::Null);
            info!(source = %query.source, lead_id = %query.id, ?deal_id, "created deal from transport lead");
            (StatusCode::OK, Json(json!({"status": "ok", "deal_id": deal_id})))
        }
        Err(e) => {
            warn!(error = %e, source = %query.source, "transport lead ingest failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()})))
        }
    }
}

/// Bitrix24 bracketed form bodies (`a[b][c]=value`) decode to a flat map
/// keyed by the literal bracketed string — mirrors the encoding
/// `hub_crm::encode::encode_form` produces on the way out.
fn decode_bracketed_form(body: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned().replace('+', " "),
            ))
        })
        .collect()
}
