use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use hub_agent::MessageCreatedPayload;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::Result;

/// `POST /sdk_agent_webhook/{agent_code}` — the helpdesk's `message_created`
/// webhook, routed into the per-conversation agent chain (C11).
pub async fn sdk_agent_webhook(
    State(state): State<Arc<AppState>>,
    Path(agent_code): Path<String>,
    Json(payload): Json<MessageCreatedPayload>,
) -> Result<Json<Value>> {
    let reply = state.agents.handle_message_created(&agent_code, payload).await?;
    Ok(Json(json!({"reply": reply, "status": "ok"})))
}
