//! Telegram-like gateway client, Wappi-shaped (not the Telegram Bot API —
//! see SPEC_FULL.md §12 on why this isn't built on `teloxide`). Adds
//! contact-id mapping and async-task polling on top of the uniform
//! `TransportClient` contract (spec §4.3).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::channel::{InstanceState, TransportClient};
use crate::error::{Result, TransportError};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const POLL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Delivered,
    Failed,
}

fn classify_task_status(raw: &str) -> TaskStatus {
    match raw {
        "delivered" => TaskStatus::Delivered,
        "error" | "undelivered" | "temporary ban" => TaskStatus::Failed,
        _ => TaskStatus::Pending,
    }
}

pub struct TgClient {
    http: reqwest::Client,
    base_url: String,
    instance_id: String,
    api_token: String,
}

impl TgClient {
    pub fn new(base_url: impl Into<String>, instance_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            instance_id: instance_id.into(),
            api_token: api_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/sync/{}/{}", self.base_url.trim_end_matches('/'), self.instance_id, path)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(self.url(path))
            .header("Authorization", &self.api_token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::UnexpectedStatus { status, body: text });
        }
        resp.json().await.map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Maps a CRM/helpdesk identity into a TG contact id.
    pub async fn get_or_create_contact(&self, phone: &str, name: &str) -> Result<String> {
        let resp = self.post("contact", json!({"phone": phone, "name": name})).await?;
        resp.get("contact_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| TransportError::Malformed("no contact_id in response".into()))
    }

    /// Resolves an inbound webhook's bare sender identifier to the
    /// contact's phone number, grounded on
    /// `original_source/wappi/handlers/inbound_wappi.py`'s `client.get_contact`.
    pub async fn resolve_contact_phone(&self, identifier: &str) -> Result<Option<String>> {
        let resp = self.post("contact/get", json!({"contact_id": identifier})).await?;
        Ok(resp.get("number").and_then(|v| v.as_str()).map(|s| s.to_string()))
    }

    /// Submits a file-send as an async task and polls `/task/get` every
    /// 5 s until a terminal status or the 600 s overall timeout.
    pub async fn send_file_async(&self, phone: &str, url: &str, caption: Option<&str>) -> Result<()> {
        let submitted = self
            .post("message/file", json!({"recipient": phone, "url": url, "caption": caption}))
            .await?;
        let task_id = submitted
            .get("task_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TransportError::Malformed("no task_id in submit response".into()))?
            .to_string();

        let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::TaskTimeout(POLL_TIMEOUT.as_secs()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            let poll = self.post("task/get", json!({"task_id": task_id})).await?;
            let raw_status = poll.get("status").and_then(|v| v.as_str()).unwrap_or("");
            match classify_task_status(raw_status) {
                TaskStatus::Delivered => {
                    info!(task_id, "tg async task delivered");
                    return Ok(());
                }
                TaskStatus::Failed => {
                    warn!(task_id, status = raw_status, "tg async task failed");
                    return Err(TransportError::TaskFailed(raw_status.to_string()));
                }
                TaskStatus::Pending => continue,
            }
        }
    }
}

#[async_trait]
impl TransportClient for TgClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
        self.post("message/text", json!({"recipient": phone, "text": text})).await?;
        Ok(())
    }

    async fn send_file_by_url(
        &self,
        phone: &str,
        url: &str,
        _filename: Option<&str>,
        caption: Option<&str>,
    ) -> Result<()> {
        self.send_file_async(phone, url, caption).await
    }

    async fn send_contact(
        &self,
        phone: &str,
        contact_phone: &str,
        first: &str,
        last: Option<&str>,
    ) -> Result<()> {
        self.post(
            "message/contact",
            json!({"recipient": phone, "phone": contact_phone, "first_name": first, "last_name": last}),
        )
        .await?;
        Ok(())
    }

    async fn get_instance_phone(&self) -> Result<String> {
        let resp = self.post("profile/get", json!({})).await?;
        resp.get("phone")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| TransportError::Malformed("no phone in profile response".into()))
    }

    async fn get_instance_state(&self) -> Result<InstanceState> {
        let resp = self.post("profile/get", json!({})).await?;
        let state = resp.get("status").and_then(|v| v.as_str()).unwrap_or("");
        Ok(InstanceState::from_wire(state))
    }
}

// ── Inbound webhook decoding ─────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TgWebhook {
    #[serde(default)]
    pub messages: Vec<TgInboundMessage>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TgInboundMessage {
    pub wh_type: String,
    #[serde(default)]
    pub body: Option<String>,
    pub from: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub file_link: Option<String>,
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_terminal_statuses() {
        assert_eq!(classify_task_status("delivered"), TaskStatus::Delivered);
        assert_eq!(classify_task_status("error"), TaskStatus::Failed);
        assert_eq!(classify_task_status("undelivered"), TaskStatus::Failed);
        assert_eq!(classify_task_status("temporary ban"), TaskStatus::Failed);
        assert_eq!(classify_task_status("queued"), TaskStatus::Pending);
    }
}
