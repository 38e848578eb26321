use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// `GET /health` — not named in spec §6 but carried regardless (ambient
/// observability, SPEC_FULL.md §10.5), matching `skynet-gateway::http::health`.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "agents": state.config.agents.len(),
        "portals": state.config.crm.portals.len(),
        "transports": state.transports.len(),
    }))
}
