use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hub_core::normalize::check_message_for_markers;
use hub_core::types::{HelpdeskMessage, MessageType};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::error::{HelpdeskError, Result};
use crate::notifier::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    Open,
    Resolved,
    Snoozed,
}

impl ConversationStatus {
    fn as_str(self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Resolved => "resolved",
            ConversationStatus::Snoozed => "snoozed",
        }
    }
}

/// Helpdesk client (C2), Chatwoot-shaped.
pub struct HelpdeskClient {
    http: reqwest::Client,
    base_url: String,
    account_id: i64,
    token: String,
    notifier: Arc<dyn Notifier>,
}

impl HelpdeskClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        account_id: i64,
        timeout_ms: u64,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            account_id,
            token: token.into(),
            notifier,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            path
        )
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        expected: &[u16],
    ) -> Result<Value> {
        let mut req = self
            .http
            .request(method, self.url(path))
            .header("api_access_token", &self.token);
        if let Some(b) = &body {
            req = req.json(b);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        if !expected.is_empty() && !expected.contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            warn!(path = %path, status, body = %text, "unexpected helpdesk status");
            return Err(HelpdeskError::UnexpectedStatus { status, body: text });
        }
        if status == 204 {
            return Ok(Value::Null);
        }
        resp.json::<Value>()
            .await
            .map_err(|e| HelpdeskError::Malformed(e.to_string()))
    }

    /// `GetOrCreateContact(name, identifier, phone?) -> (contact_id, created)`.
    #[instrument(skip(self))]
    pub async fn get_or_create_contact(
        &self,
        name: &str,
        identifier: &str,
        phone: Option<&str>,
    ) -> Result<(i64, bool)> {
        let search = self
            .request(
                reqwest::Method::GET,
                &format!("/contacts/search?q={identifier}"),
                None,
                &[200],
            )
            .await?;
        if let Some(id) = search
            .get("payload")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_i64())
        {
            return Ok((id, false));
        }

        let mut payload = json!({"name": name, "identifier": identifier});
        if let Some(phone) = phone {
            payload["phone_number"] = json!(phone);
        }
        let created = self
            .request(reqwest::Method::POST, "/contacts", Some(payload), &[200, 201])
            .await?;
        let id = created
            .get("payload")
            .and_then(|p| p.get("contact"))
            .and_then(|c| c.get("id"))
            .or_else(|| created.get("id"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HelpdeskError::Malformed("no contact id in create response".into()))?;
        Ok((id, true))
    }

    /// `GetOrCreateConversation(contact_id, inbox_id, source_id?, assignee_id?)
    /// -> (conversation_id, created)`; on creation the conversation is
    /// opened explicitly.
    #[instrument(skip(self))]
    pub async fn get_or_create_conversation(
        &self,
        contact_id: i64,
        inbox_id: i64,
        source_id: Option<&str>,
        assignee_id: Option<i64>,
    ) -> Result<(i64, bool)> {
        let existing = self
            .request(
                reqwest::Method::GET,
                &format!("/contacts/{contact_id}/conversations"),
                None,
                &[200],
            )
            .await?;
        if let Some(conv) = existing
            .get("payload")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.iter().find(|c| c.get("inbox_id").and_then(|v| v.as_i64()) == Some(inbox_id)))
        {
            let id = conv
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| HelpdeskError::Malformed("conversation missing id".into()))?;
            return Ok((id, false));
        }

        let mut payload = json!({"contact_id": contact_id, "inbox_id": inbox_id});
        if let Some(sid) = source_id {
            payload["source_id"] = json!(sid);
        }
        if let Some(aid) = assignee_id {
            payload["assignee_id"] = json!(aid);
        }
        let created = self
            .request(reqwest::Method::POST, "/conversations", Some(payload), &[200, 201])
            .await?;
        let id = created
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| HelpdeskError::Malformed("no conversation id in create response".into()))?;
        self.set_status(id, ConversationStatus::Open).await?;
        Ok((id, true))
    }

    /// Looks up an existing conversation for `(contact_id, inbox_id)`
    /// without creating one — used by deal-sync init-link, which only
    /// wants to discover conversations that already exist.
    #[instrument(skip(self))]
    pub async fn find_conversation_id(&self, contact_id: i64, inbox_id: i64) -> Result<Option<i64>> {
        let existing = self
            .request(
                reqwest::Method::GET,
                &format!("/contacts/{contact_id}/conversations"),
                None,
                &[200],
            )
            .await?;
        Ok(existing
            .get("payload")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.iter().find(|c| c.get("inbox_id").and_then(|v| v.as_i64()) == Some(inbox_id)))
            .and_then(|conv| conv.get("id"))
            .and_then(|v| v.as_i64()))
    }

    /// Searches for a contact by identifier without creating one.
    #[instrument(skip(self))]
    pub async fn find_contact_id(&self, identifier: &str) -> Result<Option<i64>> {
        let search = self
            .request(
                reqwest::Method::GET,
                &format!("/contacts/search?q={identifier}"),
                None,
                &[200],
            )
            .await?;
        Ok(search
            .get("payload")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("id"))
            .and_then(|v| v.as_i64()))
    }

    /// `GetAllMessages(conversation_id)`: cursor-paginated by
    /// `before=min(id on last page)` until an empty page; deduplicated by
    /// id, ordered ascending.
    #[instrument(skip(self))]
    pub async fn get_all_messages(&self, conversation_id: i64) -> Result<Vec<HelpdeskMessage>> {
        let mut seen = std::collections::HashMap::new();
        let mut before: Option<i64> = None;

        loop {
            let path = match before {
                Some(b) => format!("/conversations/{conversation_id}/messages?before={b}"),
                None => format!("/conversations/{conversation_id}/messages"),
            };
            let page = self.request(reqwest::Method::GET, &path, None, &[200]).await?;
            let items = page
                .get("payload")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }
            let mut min_id = i64::MAX;
            for item in &items {
                if let Some(msg) = parse_message(conversation_id, item) {
                    min_id = min_id.min(msg.id);
                    seen.insert(msg.id, msg);
                }
            }
            if min_id == i64::MAX {
                break;
            }
            before = Some(min_id);
        }

        let mut messages: Vec<HelpdeskMessage> = seen.into_values().collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    /// `SendMessage(conversation_id, content, message_type, private)`.
    /// Side effect: emits `NotifyResponsible` when a non-private,
    /// non-activity message matches the marker set.
    #[instrument(skip(self, content))]
    pub async fn send_message(
        &self,
        conversation_id: i64,
        content: &str,
        message_type: MessageType,
        private: bool,
    ) -> Result<HelpdeskMessage> {
        let payload = json!({
            "content": content,
            "message_type": match message_type {
                MessageType::Incoming => "incoming",
                MessageType::Outgoing => "outgoing",
                MessageType::Activity => "activity",
            },
            "private": private,
        });
        let created = self
            .request(
                reqwest::Method::POST,
                &format!("/conversations/{conversation_id}/messages"),
                Some(payload),
                &[200, 201],
            )
            .await?;
        let msg = parse_message(conversation_id, &created)
            .ok_or_else(|| HelpdeskError::Malformed("malformed sent-message response".into()))?;

        if !private && !matches!(message_type, MessageType::Activity) {
            if let Some(marker) = check_message_for_markers(content) {
                info!(conversation_id, marker, "marker detected, notifying responsible");
                self.notifier.notify_responsible(conversation_id, marker).await;
            }
        }
        Ok(msg)
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, conversation_id: i64, status: ConversationStatus) -> Result<()> {
        self.request(
            reqwest::Method::POST,
            &format!("/conversations/{conversation_id}/toggle_status"),
            Some(json!({"status": status.as_str()})),
            &[200],
        )
        .await?;
        Ok(())
    }

    /// Any message with `message_type = 0` (client-originated).
    #[instrument(skip(self))]
    pub async fn has_client_message(&self, conversation_id: i64) -> Result<bool> {
        let messages = self.get_all_messages(conversation_id).await?;
        Ok(messages.iter().any(|m| matches!(m.message_type, MessageType::Incoming)))
    }

    /// Any non-private, non-activity message at all.
    #[instrument(skip(self))]
    pub async fn is_active_conversation(&self, conversation_id: i64) -> Result<bool> {
        let messages = self.get_all_messages(conversation_id).await?;
        Ok(messages
            .iter()
            .any(|m| !m.private && !matches!(m.message_type, MessageType::Activity)))
    }

    /// Close iff no non-private, non-activity message exists.
    #[instrument(skip(self))]
    pub async fn close_if_inactive(&self, conversation_id: i64) -> Result<bool> {
        if self.is_active_conversation(conversation_id).await? {
            return Ok(false);
        }
        self.set_status(conversation_id, ConversationStatus::Resolved).await?;
        Ok(true)
    }

    #[instrument(skip(self, value))]
    pub async fn set_custom_attribute(&self, conversation_id: i64, key: &str, value: &str) -> Result<()> {
        self.request(
            reqwest::Method::POST,
            &format!("/conversations/{conversation_id}/custom_attributes"),
            Some(json!({"custom_attributes": {key: value}})),
            &[200],
        )
        .await?;
        Ok(())
    }

    /// `bx24_deal_id = deal_url` custom attribute (spec §4.7 step 2).
    pub async fn set_bx24_deal_link(&self, conversation_id: i64, deal_url: &str) -> Result<()> {
        self.set_custom_attribute(conversation_id, "bx24_deal_id", deal_url).await
    }

    /// Cursor-by-page, stop on empty payload.
    #[instrument(skip(self))]
    pub async fn list_open_conversation_ids(&self, inbox_id: Option<i64>) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        let mut page = 1;
        loop {
            let path = match inbox_id {
                Some(inbox) => format!("/conversations?status=open&inbox_id={inbox}&page={page}"),
                None => format!("/conversations?status=open&page={page}"),
            };
            let resp = self.request(reqwest::Method::GET, &path, None, &[200]).await?;
            let items = resp
                .get("data")
                .and_then(|d| d.get("payload"))
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }
            for item in &items {
                if let Some(id) = item.get("id").and_then(|v| v.as_i64()) {
                    ids.push(id);
                }
            }
            page += 1;
        }
        Ok(ids)
    }

    /// Resolved per spec §9's open question: present in the original
    /// source as `get_contact_phone` (conversation → contact → phone).
    #[instrument(skip(self))]
    pub async fn get_contact_phone(&self, conversation_id: i64) -> Result<Option<String>> {
        let conv = self
            .request(
                reqwest::Method::GET,
                &format!("/conversations/{conversation_id}"),
                None,
                &[200],
            )
            .await?;
        Ok(conv
            .get("meta")
            .and_then(|m| m.get("sender"))
            .and_then(|s| s.get("phone_number"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_inbox_id_by_conversation(&self, conversation_id: i64) -> Result<i64> {
        let conv = self
            .request(
                reqwest::Method::GET,
                &format!("/conversations/{conversation_id}"),
                None,
                &[200],
            )
            .await?;
        conv.get("inbox_id")
            .and_then(|v| v.as_i64())
            .ok_or(HelpdeskError::ConversationNotFound(conversation_id))
    }

    /// No non-private, non-activity message for `days` or more.
    #[instrument(skip(self))]
    pub async fn is_stopped_communication(&self, conversation_id: i64, days: i64) -> Result<bool> {
        let messages = self.get_all_messages(conversation_id).await?;
        let last = messages
            .iter()
            .filter(|m| !m.private && !matches!(m.message_type, MessageType::Activity))
            .map(|m| m.created_at)
            .max();
        match last {
            None => Ok(true),
            Some(ts) => Ok(Utc::now() - ts > chrono::Duration::days(days)),
        }
    }
}

fn parse_message(conversation_id: i64, item: &Value) -> Option<HelpdeskMessage> {
    let id = item.get("id")?.as_i64()?;
    let content = item.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let message_type = item
        .get("message_type")
        .and_then(|v| v.as_i64())
        .and_then(|v| MessageType::from_i32(v as i32))?;
    let private = item.get("private").and_then(|v| v.as_bool()).unwrap_or(false);
    let created_at = parse_timestamp(item.get("created_at")?)?;
    Some(HelpdeskMessage {
        id,
        conversation_id,
        content,
        message_type,
        private,
        created_at,
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(n) = value.as_f64() {
        return hub_core::normalize::normalize_timestamp_numeric(n);
    }
    if let Some(s) = value.as_str() {
        return hub_core::normalize::normalize_timestamp_str(s);
    }
    None
}
