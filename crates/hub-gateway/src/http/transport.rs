use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use hub_core::normalize::{helpdesk_identifier, normalize_phone};
use hub_core::types::MessageType;
use hub_pipeline::{enrich, CanonicalMessage, InboundMedia};
use hub_transports::{parse_inbound_message, TgWebhook, WaInboundMessage, WaWebhook};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::{GatewayError, Result};

/// `POST /{agent_code}/{kind}/to/chatwoot/{inbox_id}` — a transport's
/// inbound webhook, decoded into a `CanonicalMessage` (C9) and delivered
/// into the helpdesk. Grounded on
/// `original_source/chatwoot_api/handlers/handle_to_chatwoot.py`.
pub async fn inbound(
    State(state): State<Arc<AppState>>,
    Path((agent_code, kind, inbox_id)): Path<(String, String, i64)>,
    body: axum::body::Bytes,
) -> Result<Json<Value>> {
    match kind.as_str() {
        "wa" => inbound_wa(&state, &agent_code, inbox_id, &body).await,
        "tg" => inbound_tg(&state, &agent_code, inbox_id, &body).await,
        other => Err(GatewayError::BadRequest(format!("unsupported transport kind: {other}"))),
    }
}

async fn inbound_wa(state: &AppState, agent_code: &str, inbox_id: i64, body: &[u8]) -> Result<Json<Value>> {
    let webhook: WaWebhook = match serde_json::from_slice(body) {
        Ok(w) => w,
        Err(e) => return Err(GatewayError::BadRequest(format!("malformed wa webhook: {e}"))),
    };

    if webhook.type_webhook == "stateInstanceChanged" {
        // This route is already scoped to one instance by its `inbox_id` path
        // segment, so activation toggles directly rather than through
        // `hub_pipeline::handle_state_instance_changed`'s wid-lookup path
        // (that one serves a shared, instance-agnostic webhook endpoint).
        let active = webhook.state_instance.as_deref() == Some("authorized");
        state.routing.set_active(inbox_id, active)?;
        return Ok(Json(json!({"status": "ok"})));
    }

    if webhook.type_webhook != "incomingMessageReceived" {
        return Ok(Json(json!({"status": "skipped", "reason": "unhandled webhook type"})));
    }

    let Some(sender) = webhook.sender_data.as_ref() else {
        return Ok(Json(json!({"status": "skipped", "reason": "no senderData"})));
    };
    let Some(chat_id) = sender.chat_id.clone() else {
        return Ok(Json(json!({"status": "skipped", "reason": "no chatId"})));
    };
    let Some(message_data) = webhook.message_data.as_ref() else {
        return Ok(Json(json!({"status": "skipped", "reason": "no messageData"})));
    };
    let id_message = webhook.id_message.clone().unwrap_or_default();
    let phone = normalize_phone(sender.sender.as_deref().unwrap_or(&chat_id));
    let sender_name = sender.sender_name.clone().unwrap_or_else(|| phone.clone());

    let Some(wa_client) = state.wa_clients.get(&inbox_id) else {
        return Err(GatewayError::BadRequest(format!("no wa client for inbox {inbox_id}")));
    };

    let (body_text, media) = match parse_inbound_message(message_data) {
        WaInboundMessage::Text(text) | WaInboundMessage::ExtendedText(text) => (text, InboundMedia::None),
        WaInboundMessage::Quoted { original, reply } => {
            (format!("> {original}\n{reply}"), InboundMedia::None)
        }
        WaInboundMessage::Image { caption, file_message_id } => {
            let (url, _name) = wa_client.download_file_url(&chat_id, &file_message_id).await?;
            (String::new(), InboundMedia::Image { url, caption })
        }
        WaInboundMessage::Document { caption, file_message_id } => {
            let (url, name) = wa_client.download_file_url(&chat_id, &file_message_id).await?;
            let _ = &caption;
            (String::new(), InboundMedia::Document { url, file_name: name })
        }
        WaInboundMessage::Audio { file_message_id } | WaInboundMessage::Video { file_message_id } => {
            let (url, _name) = wa_client.download_file_url(&chat_id, &file_message_id).await?;
            (String::new(), InboundMedia::Audio { url })
        }
        WaInboundMessage::Contact { name, vcard } => (format!("[Контакт] {name}\n{vcard}"), InboundMedia::None),
        WaInboundMessage::Location { latitude, longitude, address } => {
            (format!("[Геопозиция] {address} ({latitude}, {longitude})"), InboundMedia::None)
        }
        WaInboundMessage::Sticker { emoji } => (emoji.unwrap_or_else(|| "[Стикер]".to_string()), InboundMedia::None),
        WaInboundMessage::Poll { question, options } => {
            (format!("[Опрос] {question}\n{}", options.join(", ")), InboundMedia::None)
        }
        WaInboundMessage::Unhandled => ("[Неподдерживаемый тип сообщения]".to_string(), InboundMedia::None),
    };

    let message = CanonicalMessage {
        inbox_id,
        sender_phone: phone,
        sender_name,
        media,
        body: body_text,
    };
    deliver_to_helpdesk(state, agent_code, inbox_id, &id_message, message).await
}

async fn inbound_tg(state: &AppState, agent_code: &str, inbox_id: i64, body: &[u8]) -> Result<Json<Value>> {
    let webhook: TgWebhook = match serde_json::from_slice(body) {
        Ok(w) => w,
        Err(e) => return Err(GatewayError::BadRequest(format!("malformed tg webhook: {e}"))),
    };
    let Some(message) = webhook.messages.into_iter().next() else {
        return Ok(Json(json!({"status": "skipped", "reason": "no messages"})));
    };
    if message.wh_type != "incoming_message" {
        return Ok(Json(json!({"status": "skipped", "reason": "unhandled wh_type"})));
    }
    let Some(identifier) = message.from.clone() else {
        return Ok(Json(json!({"status": "skipped", "reason": "no sender identifier"})));
    };

    let Some(tg_client) = state.tg_clients.get(&inbox_id) else {
        return Err(GatewayError::BadRequest(format!("no tg client for inbox {inbox_id}")));
    };
    let Some(phone) = tg_client.resolve_contact_phone(&identifier).await? else {
        return Ok(Json(json!({"status": "skipped", "reason": "contact has no phone"})));
    };
    let phone = normalize_phone(&phone);

    let body_text = message.body.clone().unwrap_or_default();
    let media = match message.kind.as_deref() {
        Some("image") => InboundMedia::Image {
            url: message.file_link.clone().unwrap_or_default(),
            caption: message.caption.clone(),
        },
        Some("ptt") => InboundMedia::Audio { url: message.file_link.clone().unwrap_or_default() },
        Some("document") => InboundMedia::Document {
            url: message.file_link.clone().unwrap_or_default(),
            file_name: message.caption.clone().unwrap_or_else(|| "document".to_string()),
        },
        _ => InboundMedia::None,
    };

    let canonical = CanonicalMessage {
        inbox_id,
        sender_phone: phone,
        sender_name: identifier,
        media,
        body: body_text,
    };
    deliver_to_helpdesk(state, agent_code, inbox_id, "", canonical).await
}

async fn deliver_to_helpdesk(
    state: &AppState,
    agent_code: &str,
    inbox_id: i64,
    source_id: &str,
    message: CanonicalMessage,
) -> Result<Json<Value>> {
    let enriched = enrich(message, state.summarizer.as_ref(), state.summarizer.as_ref(), state.voice.as_ref()).await;

    let identifier = helpdesk_identifier(&enriched.sender_phone);
    let (contact_id, _created) = state
        .helpdesk
        .get_or_create_contact(&enriched.sender_name, &identifier, Some(&enriched.sender_phone))
        .await?;
    let assignee_id = state.directory.transport_for_inbox(inbox_id).and_then(|t| t.assignee_id);
    let source_id = (!source_id.is_empty()).then(|| source_id.to_string());
    let (conversation_id, _created) = state
        .helpdesk
        .get_or_create_conversation(contact_id, inbox_id, source_id.as_deref(), assignee_id)
        .await?;
    state
        .helpdesk
        .send_message(conversation_id, &enriched.body, MessageType::Incoming, false)
        .await?;
    info!(agent_code, inbox_id, conversation_id, "delivered transport message to helpdesk");
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct ChatwootOutboundPayload {
    pub event: String,
    #[serde(default)]
    pub private: bool,
    pub message_type: Option<String>,
    #[serde(default)]
    pub content: String,
    pub conversation: ChatwootOutboundConversation,
}

#[derive(Debug, Deserialize)]
pub struct ChatwootOutboundConversation {
    pub id: i64,
}

/// `POST /{agent_code}/{kind}/from/chatwoot/{inbox_id}` — an agent's reply
/// leaving the helpdesk, dispatched out over the transport it arrived on.
/// Grounded on `original_source/chatwoot_api/handlers/handle_from_chatwoot.py`.
pub async fn outbound(
    State(state): State<Arc<AppState>>,
    Path((_agent_code, _kind, _inbox_id)): Path<(String, String, i64)>,
    Json(payload): Json<ChatwootOutboundPayload>,
) -> Result<Json<Value>> {
    if payload.private || payload.event != "message_created" || payload.message_type.as_deref() != Some("outgoing") {
        return Ok(Json(json!({"status": "ignored"})));
    }
    if let Err(e) = state.outbound.dispatch(payload.conversation.id, &payload.content).await {
        warn!(error = %e, conversation_id = payload.conversation.id, "outbound dispatch failed");
        return Err(e.into());
    }
    Ok(Json(json!({"status": "ok"})))
}
