use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use hub_core::config::AgentDirectory;
use hub_core::normalize::{helpdesk_identifier, normalize_phone};
use hub_crm::CrmClient;
use hub_helpdesk::{HelpdeskClient, Notifier};
use hub_links::LinkRegistry;
use hub_mutex::{event_code, EventMutex};
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::deal::{self, DealRow};
use crate::error::{DealSyncError, Result};

/// Literal Bitrix24 user ids notified alongside the deal's assignee
/// (spec §4.7's `NotifyResponsible`).
const NOTIFY_USER_IDS: &[i64] = &[182, 6784, 6014];

/// Stage/timeline/call sync for CRM deals (C7). Owns one `CrmClient` per
/// portal so it can resolve `NotifyResponsible` (triggered by C2, which has
/// no notion of portals) purely from `conversation_id`.
pub struct DealSyncEngine {
    crm_clients: HashMap<String, Arc<CrmClient>>,
    helpdesk: Arc<HelpdeskClient>,
    links: Arc<LinkRegistry>,
    mutex: Arc<EventMutex>,
    conn: Arc<Mutex<Connection>>,
    directory: Arc<AgentDirectory>,
}

impl DealSyncEngine {
    pub fn new(
        crm_clients: HashMap<String, Arc<CrmClient>>,
        helpdesk: Arc<HelpdeskClient>,
        links: Arc<LinkRegistry>,
        mutex: Arc<EventMutex>,
        conn: Arc<Mutex<Connection>>,
        directory: Arc<AgentDirectory>,
    ) -> Self {
        Self {
            crm_clients,
            helpdesk,
            links,
            mutex,
            conn,
            directory,
        }
    }

    fn crm(&self, portal: &str) -> Result<&CrmClient> {
        self.crm_clients
            .get(portal)
            .map(|c| c.as_ref())
            .ok_or_else(|| DealSyncError::UnknownPortal(portal.to_string()))
    }

    /// Full webhook-driven sync: upsert, init-link, stage sync, comment
    /// sync, transcription enqueue — linearized under the bare
    /// `{portal}:DEAL:{id}` event code. Returns `false` if another worker
    /// already owns the lock (caller should short-circuit with HTTP 200).
    #[instrument(skip(self))]
    pub async fn handle_deal_update(&self, portal: &str, deal_id: i64) -> Result<bool> {
        let code = event_code(portal, deal_id, None);
        if !self.mutex.acquire(&code)? {
            info!(portal, deal_id, "deal sync already in progress, skipping");
            return Ok(false);
        }
        let result = self.run_full_sync(portal, deal_id).await;
        self.mutex
            .release(&code, result.as_ref().err().map(|e| e.to_string()).as_deref())?;
        result?;
        Ok(true)
    }

    async fn run_full_sync(&self, portal: &str, deal_id: i64) -> Result<()> {
        self.upsert_deal(portal, deal_id).await?;
        let (ok, conversation_ids, _contact_id) = self.init_link(portal, deal_id).await?;
        if !ok || conversation_ids.is_empty() {
            return Ok(());
        }
        self.sync_stage_inner(portal, deal_id).await?;
        self.sync_timeline_comments_inner(portal, deal_id).await?;
        self.enqueue_transcription(portal, deal_id)?;
        Ok(())
    }

    /// `Upsert Deal row` from CRM `crm.deal.get`: funnel, contact, stage.
    #[instrument(skip(self))]
    pub async fn upsert_deal(&self, portal: &str, deal_id: i64) -> Result<DealRow> {
        let crm = self.crm(portal)?;
        let resp = crm.call("crm.deal.get", json!({"id": deal_id})).await?;
        let bx_deal = resp
            .get("result")
            .ok_or_else(|| DealSyncError::Malformed("crm.deal.get missing result".into()))?;

        let funnel_id = bx_deal
            .get("CATEGORY_ID")
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or_else(|| v.as_i64()));
        let contact_id = bx_deal.get("CONTACT_ID").and_then(value_to_i64);
        let stage_id = bx_deal.get("STAGE_ID").and_then(|v| v.as_str()).map(str::to_string);

        {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::upsert(&guard, portal, deal_id, funnel_id, contact_id, stage_id.as_deref())?;
        }
        let guard = self.conn.lock().expect("dealsync db mutex poisoned");
        deal::get(&guard, portal, deal_id)?.ok_or_else(|| DealSyncError::DealNotFound {
            portal: portal.to_string(),
            deal_id,
        })
    }

    /// Resolves the contact's phone, finds every active conversation for
    /// it across configured inboxes, links each one to the deal, writes
    /// the `bx24_deal_id` custom attribute, and picks a primary if none
    /// is set yet.
    #[instrument(skip(self))]
    pub async fn init_link(&self, portal: &str, deal_id: i64) -> Result<(bool, Vec<i64>, Option<i64>)> {
        let deal_row = {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::get(&guard, portal, deal_id)?
        }
        .ok_or_else(|| DealSyncError::DealNotFound {
            portal: portal.to_string(),
            deal_id,
        })?;

        let Some(bx_contact_id) = deal_row.contact_id else {
            return Ok((false, Vec::new(), None));
        };

        let crm = self.crm(portal)?;
        let contact_resp = crm.call("crm.contact.get", json!({"id": bx_contact_id})).await?;
        let phone_raw = contact_resp
            .get("result")
            .and_then(|c| c.get("PHONE"))
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p| p.get("VALUE"))
            .and_then(|v| v.as_str());

        let Some(phone_raw) = phone_raw else {
            return Ok((false, Vec::new(), None));
        };
        let phone = normalize_phone(phone_raw);
        let identifier = helpdesk_identifier(&phone);

        let Some(cw_contact_id) = self.helpdesk.find_contact_id(&identifier).await? else {
            return Ok((false, Vec::new(), None));
        };

        let inbox_ids = self.candidate_inbox_ids();
        let mut linked = Vec::new();
        for inbox_id in inbox_ids {
            let Some(conversation_id) = self.helpdesk.find_conversation_id(cw_contact_id, inbox_id).await? else {
                continue;
            };
            if !self.helpdesk.is_active_conversation(conversation_id).await? {
                continue;
            }
            let deal_url = format!("https://{portal}/crm/deal/details/{deal_id}/");
            self.helpdesk.set_bx24_deal_link(conversation_id, &deal_url).await?;
            self.links
                .link_deal_with_conversation(portal, deal_id, conversation_id, inbox_id, cw_contact_id)?;
            linked.push(conversation_id);
        }

        if !linked.is_empty() && self.links.get_selected_conversation_id(portal, deal_id)?.is_none() {
            self.links.set_primary(portal, deal_id, linked[0])?;
        }

        {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::mark_synced(&guard, portal, deal_id)?;
        }

        Ok((!linked.is_empty(), linked, Some(cw_contact_id)))
    }

    fn candidate_inbox_ids(&self) -> Vec<i64> {
        // The deal-sync engine links against every configured inbox; the
        // routing engine (C4) separately decides which one is live for a
        // fresh inbound conversation.
        self.directory.all_transports().iter().map(|t| t.inbox_id).collect()
    }

    /// `sync_stage`, linearized under the `...:STAGE` suffix.
    #[instrument(skip(self))]
    pub async fn sync_stage(&self, portal: &str, deal_id: i64) -> Result<bool> {
        let code = event_code(portal, deal_id, Some("STAGE"));
        if !self.mutex.acquire(&code)? {
            return Ok(false);
        }
        let result = self.sync_stage_inner(portal, deal_id).await;
        self.mutex
            .release(&code, result.as_ref().err().map(|e| e.to_string()).as_deref())?;
        result
    }

    async fn sync_stage_inner(&self, portal: &str, deal_id: i64) -> Result<bool> {
        let crm = self.crm(portal)?;
        let resp = crm.call("crm.deal.get", json!({"id": deal_id})).await?;
        let new_stage_id = resp
            .get("result")
            .and_then(|d| d.get("STAGE_ID"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| DealSyncError::Malformed("crm.deal.get missing STAGE_ID".into()))?;

        let old_stage_id = {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::get(&guard, portal, deal_id)?.and_then(|d| d.stage_id)
        };

        if old_stage_id.as_deref() == Some(new_stage_id) {
            return Ok(true);
        }

        {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::set_stage(&guard, portal, deal_id, new_stage_id)?;
        }

        // First observation of a stage is just recorded, not announced.
        let Some(old_stage_id) = old_stage_id else {
            return Ok(true);
        };

        let links = self.links.get_links_for_deal(portal, deal_id)?;
        if links.is_empty() {
            return Ok(true);
        }

        let old_name = self.resolve_stage_name(portal, &old_stage_id).await;
        let new_name = self.resolve_stage_name(portal, new_stage_id).await;
        let note = format!("[смена стадии сделки BX24]\n\n{old_name} → {new_name}");

        for link in &links {
            self.helpdesk
                .send_message(link.conversation_id, &note, hub_core::types::MessageType::Outgoing, true)
                .await?;
        }

        let guard = self.conn.lock().expect("dealsync db mutex poisoned");
        deal::mark_synced(&guard, portal, deal_id)?;
        Ok(true)
    }

    async fn resolve_stage_name(&self, portal: &str, status_id: &str) -> String {
        let Ok(crm) = self.crm(portal) else {
            return status_id.to_string();
        };
        match crm
            .call("crm.status.list", json!({"filter": {"STATUS_ID": status_id}}))
            .await
        {
            Ok(resp) => resp
                .get("result")
                .and_then(|arr| arr.as_array())
                .and_then(|arr| arr.first())
                .and_then(|s| s.get("NAME"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| status_id.to_string()),
            Err(e) => {
                warn!(portal, status_id, error = %e, "failed to resolve stage name");
                status_id.to_string()
            }
        }
    }

    /// `sync_timeline_comments`, linearized under the `...:COMMENTS` suffix.
    #[instrument(skip(self))]
    pub async fn sync_timeline_comments(&self, portal: &str, deal_id: i64) -> Result<bool> {
        let code = event_code(portal, deal_id, Some("COMMENTS"));
        if !self.mutex.acquire(&code)? {
            return Ok(false);
        }
        let result = self.sync_timeline_comments_inner(portal, deal_id).await;
        self.mutex
            .release(&code, result.as_ref().err().map(|e| e.to_string()).as_deref())?;
        result?;
        Ok(true)
    }

    async fn sync_timeline_comments_inner(&self, portal: &str, deal_id: i64) -> Result<()> {
        let crm = self.crm(portal)?;
        let resp = crm
            .call(
                "crm.timeline.comment.list",
                json!({
                    "filter": {"ENTITY_ID": deal_id, "ENTITY_TYPE": "deal"},
                    "select": ["ID", "CREATED", "COMMENT"],
                }),
            )
            .await?;
        let mut comments: Vec<Value> = resp
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        comments.sort_by_key(|c| c.get("ID").and_then(value_to_i64).unwrap_or(0));

        let last_sync_comment_id = {
            let guard = self.conn.lock().expect("dealsync db mutex poisoned");
            deal::get(&guard, portal, deal_id)?
                .map(|d| d.last_sync_comment_id)
                .unwrap_or(0)
        };

        let new_comments: Vec<&Value> = comments
            .iter()
            .filter(|c| c.get("ID").and_then(value_to_i64).unwrap_or(0) > last_sync_comment_id)
            .collect();
        if new_comments.is_empty() {
            return Ok(());
        }

        let links = self.links.get_links_for_deal(portal, deal_id)?;
        let mut max_id = last_sync_comment_id;
        for comment in &new_comments {
            let id = comment.get("ID").and_then(value_to_i64).unwrap_or(0);
            let text = comment.get("COMMENT").and_then(|v| v.as_str()).unwrap_or_default();
            let note = format!("Комментарий из сделки BX24:\n {text}");
            for link in &links {
                self.helpdesk
                    .send_message(link.conversation_id, &note, hub_core::types::MessageType::Outgoing, true)
                    .await?;
            }
            max_id = max_id.max(id);
        }

        let guard = self.conn.lock().expect("dealsync db mutex poisoned");
        deal::bump_last_sync_comment_id(&guard, portal, deal_id, max_id)?;
        Ok(())
    }

    /// Inserts a new `TranscriptionJob` iff no active job exists for
    /// `(portal, deal_id)` — relies on the partial unique index.
    #[instrument(skip(self))]
    pub fn enqueue_transcription(&self, portal: &str, deal_id: i64) -> Result<()> {
        let guard = self.conn.lock().expect("dealsync db mutex poisoned");
        let now = Utc::now().to_rfc3339();
        guard.execute(
            "INSERT OR IGNORE INTO transcription_job
                (portal, deal_bx_id, status, attempt, priority, next_run_at, created_at, updated_at)
             VALUES (?1, ?2, 'new', 0, 100, ?3, ?3, ?3)",
            rusqlite::params![portal, deal_id, now],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for DealSyncEngine {
    #[instrument(skip(self))]
    async fn notify_responsible(&self, conversation_id: i64, marker: &str) {
        if let Err(e) = self.notify_responsible_inner(conversation_id, marker).await {
            warn!(conversation_id, marker, error = %e, "failed to notify responsible");
        }
    }
}

impl DealSyncEngine {
    async fn notify_responsible_inner(&self, conversation_id: i64, marker: &str) -> Result<()> {
        let deals = self.links.get_deals_for_conversation(conversation_id)?;
        if deals.is_empty() {
            warn!(conversation_id, "marker fired but no deal is linked to this conversation");
            return Ok(());
        }

        for (portal, deal_id) in deals {
            let crm = match self.crm(&portal) {
                Ok(crm) => crm,
                Err(_) => continue,
            };
            let resp = crm.call("crm.deal.get", json!({"id": deal_id})).await?;
            let Some(bx_deal) = resp.get("result") else { continue };
            if bx_deal.get("CLOSED").and_then(|v| v.as_str()) == Some("Y") {
                continue;
            }
            let Some(assigned_id) = bx_deal.get("ASSIGNED_BY_ID").and_then(value_to_i64) else {
                warn!(portal = %portal, deal_id, "deal has no assignee, cannot notify");
                continue;
            };

            let mut user_ids: Vec<i64> = NOTIFY_USER_IDS.to_vec();
            user_ids.push(assigned_id);

            let chat_resp = crm
                .call(
                    "im.chat.get",
                    json!({"ENTITY_TYPE": "CRM", "ENTITY_ID": format!("DEAL|{deal_id}")}),
                )
                .await?;
            let mut chat_id = chat_resp.get("result").and_then(|r| r.get("ID")).and_then(value_to_i64);

            if chat_id.is_none() {
                let title = bx_deal
                    .get("TITLE")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Не удалось получить название сделки.");
                let created = crm
                    .call(
                        "im.chat.add",
                        json!({
                            "TITLE": format!("СДЕЛКА: {title}"),
                            "USERS": user_ids,
                            "ENTITY_TYPE": "CRM",
                            "ENTITY_ID": format!("DEAL|{deal_id}"),
                        }),
                    )
                    .await?;
                chat_id = created.get("result").and_then(value_to_i64);
            }

            let Some(chat_id) = chat_id else {
                warn!(portal = %portal, deal_id, "could not resolve or create BX24 chat");
                continue;
            };

            let message = format!(
                "Обратите внимание на переписку Агента с клиентом в mbk-chat!\nОбнаруженно слово: {marker}\nID диалога в CW: {conversation_id}"
            );
            crm.call(
                "im.message.add",
                json!({"DIALOG_ID": format!("chat{chat_id}"), "MESSAGE": message}),
            )
            .await?;
        }

        Ok(())
    }
}

fn value_to_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
