use hub_routing::RoutingEngine;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::Result;

/// Green-API `stateInstanceChanged` webhook body (spec §4.3, §6): a WA
/// instance reports `authorized`/`notAuthorized`/`blocked` and C4 must stop
/// routing traffic to it the moment it's no longer usable.
#[derive(Debug, Clone, Deserialize)]
pub struct StateInstanceChangedPayload {
    #[serde(rename = "typeWebhook")]
    pub type_webhook: String,
    #[serde(rename = "instanceData")]
    pub instance_data: InstanceData,
    #[serde(rename = "stateInstance")]
    pub state_instance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceData {
    pub wid: String,
}

/// Maps a WA instance id to its helpdesk inbox id — supplied by the
/// composition root from `HubConfig`'s transport table.
pub trait InboxResolver: Send + Sync {
    fn inbox_for_wa_instance(&self, instance_wid: &str) -> Option<i64>;
}

#[instrument(skip(engine, resolver, payload))]
pub fn handle_state_instance_changed(
    engine: &RoutingEngine,
    resolver: &dyn InboxResolver,
    payload: StateInstanceChangedPayload,
) -> Result<()> {
    if payload.type_webhook != "stateInstanceChanged" {
        return Ok(());
    }
    let Some(inbox_id) = resolver.inbox_for_wa_instance(&payload.instance_data.wid) else {
        return Ok(());
    };
    let active = payload.state_instance == "authorized";
    engine.set_active(inbox_id, active)?;
    info!(inbox_id, active, state = %payload.state_instance, "updated transport activation from webhook");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(i64);
    impl InboxResolver for FixedResolver {
        fn inbox_for_wa_instance(&self, _instance_wid: &str) -> Option<i64> {
            Some(self.0)
        }
    }

    fn conn() -> std::sync::Arc<std::sync::Mutex<rusqlite::Connection>> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        hub_core::db::init_db(&conn).unwrap();
        std::sync::Arc::new(std::sync::Mutex::new(conn))
    }

    #[test]
    fn non_authorized_state_deactivates() {
        let directory = std::sync::Arc::new(hub_core::config::AgentDirectory::build(&[]));
        let engine = RoutingEngine::new(conn(), directory);
        let payload = StateInstanceChangedPayload {
            type_webhook: "stateInstanceChanged".to_string(),
            instance_data: InstanceData { wid: "7999@c.us".to_string() },
            state_instance: "notAuthorized".to_string(),
        };
        handle_state_instance_changed(&engine, &FixedResolver(101), payload).unwrap();
    }
}
