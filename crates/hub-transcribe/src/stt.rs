use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, TranscribeError};

/// Speech-to-text backend, injected so the worker doesn't hardcode a
/// specific provider.
#[async_trait]
pub trait SttClient: Send + Sync {
    async fn transcribe(&self, wav_path: &Path) -> Result<String>;
}

/// Generic multipart-upload STT client (OpenAI-Whisper-shaped REST API).
pub struct HttpSttClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpSttClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SttClient for HttpSttClient {
    async fn transcribe(&self, wav_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(wav_path).await?;
        let file_name = wav_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "recording.wav".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name).mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new().part("file", part).text("model", "whisper-1");

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TranscribeError::SttStatus(status.as_u16()));
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string())
    }
}
