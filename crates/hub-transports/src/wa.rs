//! WhatsApp-like gateway client, GreenAPI-shaped. Grounds spec §4.3's WA
//! send contract and inbound webhook decoding — ported from
//! `original_source/green_api/handlers/inbound_green_api.py`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::channel::{InstanceState, TransportClient};
use crate::error::{Result, TransportError};

pub struct WaClient {
    http: reqwest::Client,
    base_url: String,
    instance_id: String,
    api_token: String,
}

impl WaClient {
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

    fn url(&self, method: &str) -> String {
        format!(
            "{}/waInstance{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.instance_id,
            method,
            self.api_token
        )
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let resp = self.http.post(self.url(method)).json(&body).send().await?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::UnexpectedStatus { status, body: text });
        }
        resp.json().await.map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TransportClient for WaClient {
    async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
        self.post(
            "sendMessage",
            json!({"chatId": format!("{phone}@c.us"), "message": text}),
        )
        .await?;
        Ok(())
    }

    async fn send_file_by_url(
        &self,
        phone: &str,
        url: &str,
        filename: Option<&str>,
        caption: Option<&str>,
    ) -> Result<()> {
        self.post(
            "sendFileByUrl",
            json!({
                "chatId": format!("{phone}@c.us"),
                "urlFile": url,
                "fileName": filename.unwrap_or("file"),
                "caption": caption,
            }),
        )
        .await?;
        Ok(())
    }

    async fn send_contact(
        &self,
        phone: &str,
        contact_phone: &str,
        first: &str,
        last: Option<&str>,
    ) -> Result<()> {
        self.post(
            "sendContact",
            json!({
                "chatId": format!("{phone}@c.us"),
                "contact": {
                    "phoneContact": contact_phone,
                    "firstName": first,
                    "lastName": last,
                },
            }),
        )
        .await?;
        Ok(())
    }

    async fn get_instance_phone(&self) -> Result<String> {
        let resp = self.post("getWaSettings", json!({})).await?;
        resp.get("wid")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_end_matches("@c.us").to_string())
            .ok_or_else(|| TransportError::Malformed("no wid in getWaSettings response".into()))
    }

    async fn get_instance_state(&self) -> Result<InstanceState> {
        let resp = self.post("getStateInstance", json!({})).await?;
        let state = resp
            .get("stateInstance")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TransportError::Malformed("no stateInstance in response".into()))?;
        Ok(InstanceState::from_wire(state))
    }
}

impl WaClient {
    /// GreenAPI doesn't embed a download URL in the webhook payload itself;
    /// the recipient has to ask for one via `/downloadFile` keyed by the
    /// chat and message ids, grounded on
    /// `original_source/green_api/download_url.py`.
    pub async fn download_file_url(&self, chat_id: &str, id_message: &str) -> Result<(String, String)> {
        let resp = self
            .post("downloadFile", json!({"chatId": chat_id, "idMessage": id_message}))
            .await?;
        let download_url = resp
            .get("downloadUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TransportError::Malformed("no downloadUrl in response".into()))?
            .to_string();
        let file_name = resp
            .get("fileName")
            .and_then(|v| v.as_str())
            .unwrap_or("file")
            .to_string();
        Ok((download_url, file_name))
    }
}

// ── Inbound webhook decoding ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WaWebhook {
    #[serde(rename = "typeWebhook")]
    pub type_webhook: String,
    #[serde(rename = "stateInstance")]
    pub state_instance: Option<String>,
    pub status: Option<String>,
    pub from: Option<String>,
    #[serde(rename = "idMessage")]
    pub id_message: Option<String>,
    #[serde(rename = "senderData")]
    pub sender_data: Option<SenderData>,
    #[serde(rename = "messageData")]
    pub message_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderData {
    #[serde(rename = "senderName")]
    pub sender_name: Option<String>,
    pub sender: Option<String>,
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
}

/// The ten `incomingMessageReceived` sub-types handled by spec §4.3/§4.9.
#[derive(Debug, Clone)]
pub enum WaInboundMessage {
    Text(String),
    ExtendedText(String),
    Quoted { original: String, reply: String },
    Video { file_message_id: String },
    Image { caption: Option<String>, file_message_id: String },
    Audio { file_message_id: String },
    Document { caption: Option<String>, file_message_id: String },
    Contact { name: String, vcard: String },
    Location { latitude: f64, longitude: f64, address: String },
    Sticker { emoji: Option<String> },
    Poll { question: String, options: Vec<String> },
    Unhandled,
}

pub fn parse_inbound_message(message_data: &serde_json::Value) -> WaInboundMessage {
    let type_message = message_data.get("typeMessage").and_then(|v| v.as_str()).unwrap_or("");
    let id_message = message_data
        .get("idMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    match type_message {
        "textMessage" => WaInboundMessage::Text(
            message_data
                .get("textMessageData")
                .and_then(|d| d.get("textMessage"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        "extendedTextMessage" => WaInboundMessage::ExtendedText(
            message_data
                .get("extendedTextMessageData")
                .and_then(|d| d.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
        ),
        "quotedMessage" => {
            let reply = message_data
                .get("extendedTextMessageData")
                .and_then(|d| d.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let original = message_data
                .get("quotedMessage")
                .and_then(|d| d.get("textMessage"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            WaInboundMessage::Quoted { original, reply }
        }
        "videoMessage" => WaInboundMessage::Video { file_message_id: id_message },
        "imageMessage" => WaInboundMessage::Image {
            caption: message_data
                .get("fileMessageData")
                .and_then(|d| d.get("caption"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            file_message_id: id_message,
        },
        "audioMessage" => WaInboundMessage::Audio { file_message_id: id_message },
        "documentMessage" => WaInboundMessage::Document {
            caption: message_data
                .get("caption")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            file_message_id: id_message,
        },
        "contactMessage" => {
            let data = message_data.get("contactMessageData");
            WaInboundMessage::Contact {
                name: data
                    .and_then(|d| d.get("displayName"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Контакт")
                    .to_string(),
                vcard: data
                    .and_then(|d| d.get("vcard"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            }
        }
        "locationMessage" => {
            let data = message_data.get("locationMessageData");
            WaInboundMessage::Location {
                latitude: data.and_then(|d| d.get("latitude")).and_then(|v| v.as_f64()).unwrap_or(0.0),
                longitude: data.and_then(|d| d.get("longitude")).and_then(|v| v.as_f64()).unwrap_or(0.0),
                address: data
                    .and_then(|d| d.get("address"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            }
        }
        "stickerMessage" => WaInboundMessage::Sticker {
            emoji: message_data
                .get("stickerMessageData")
                .and_then(|d| d.get("emoji"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        },
        "pollMessage" => {
            let data = message_data.get("pollMessageData");
            WaInboundMessage::Poll {
                question: data
                    .and_then(|d| d.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("Опрос")
                    .to_string(),
                options: data
                    .and_then(|d| d.get("options"))
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|o| o.get("name").and_then(|v| v.as_str()))
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        }
        _ => WaInboundMessage::Unhandled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_text_message() {
        let data = json!({"typeMessage": "textMessage", "textMessageData": {"textMessage": "hi"}});
        match parse_inbound_message(&data) {
            WaInboundMessage::Text(t) => assert_eq!(t, "hi"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_quoted_message() {
        let data = json!({
            "typeMessage": "quotedMessage",
            "extendedTextMessageData": {"text": "reply"},
            "quotedMessage": {"textMessage": "original"},
        });
        match parse_inbound_message(&data) {
            WaInboundMessage::Quoted { original, reply } => {
                assert_eq!(original, "original");
                assert_eq!(reply, "reply");
            }
            _ => panic!("wrong variant"),
        }
    }
}
