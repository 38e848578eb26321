use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hub_agent::provider::{ChatRequest, Message, Role};
use hub_agent::LlmProvider;
use hub_pipeline::{DocumentSummarizer, ImageSummarizer, PipelineError, Result, VoiceTranscriber};
use hub_transcribe::SttClient;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Image/document summarization via a plain chat completion: the URL and
/// any caption are described to the model rather than sent as a vision
/// payload — the teacher's `OpenAiProvider` (ported into `hub-agent`) has
/// no multimodal input, and adding one is out of scope for this pass
/// (see DESIGN.md).
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }

    async fn summarize_prompt(&self, prompt: String) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: "Кратко опиши содержимое вложения одним-двумя предложениями на русском.".to_string(),
            messages: vec![Message { role: Role::User, content: prompt }],
            max_tokens: 256,
        };
        let resp = self
            .provider
            .send(&req)
            .await
            .map_err(|e| PipelineError::Enrichment(e.to_string()))?;
        Ok(resp.content)
    }
}

#[async_trait]
impl ImageSummarizer for LlmSummarizer {
    #[instrument(skip(self))]
    async fn summarize(&self, image_url: &str, caption: Option<&str>) -> Result<String> {
        let prompt = match caption {
            Some(c) => format!("Изображение по ссылке {image_url}, подпись клиента: «{c}»."),
            None => format!("Изображение по ссылке {image_url}."),
        };
        self.summarize_prompt(prompt).await
    }
}

#[async_trait]
impl DocumentSummarizer for LlmSummarizer {
    #[instrument(skip(self))]
    async fn summarize(&self, document_url: &str, file_name: &str) -> Result<String> {
        self.summarize_prompt(format!("Документ «{file_name}» по ссылке {document_url}.")).await
    }
}

/// Downloads a voice note, converts it to 16-bit mono 16 kHz WAV via
/// `ffmpeg` (same conversion C8 applies to call recordings), and submits
/// it to the shared STT backend.
pub struct SttVoiceTranscriber {
    http: reqwest::Client,
    stt: Arc<dyn SttClient>,
}

impl SttVoiceTranscriber {
    pub fn new(stt: Arc<dyn SttClient>) -> Self {
        Self {
            http: reqwest::Client::new(),
            stt,
        }
    }
}

#[async_trait]
impl VoiceTranscriber for SttVoiceTranscriber {
    #[instrument(skip(self))]
    async fn transcribe(&self, audio_url: &str) -> Result<String> {
        let tmp_dir = std::env::temp_dir();
        let id = uuid_like_suffix();
        let raw_path = tmp_dir.join(format!("voice-{id}.ogg"));
        let wav_path = tmp_dir.join(format!("voice-{id}.wav"));

        download(&self.http, audio_url, &raw_path).await?;

        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-i"])
            .arg(&raw_path)
            .args(["-ac", "1", "-ar", "16000", "-sample_fmt", "s16"])
            .arg(&wav_path)
            .status()
            .await
            .map_err(PipelineError::Io)?;
        let _ = tokio::fs::remove_file(&raw_path).await;
        if !status.success() {
            return Err(PipelineError::Enrichment(format!("ffmpeg exited with {status}")));
        }

        let text = self.stt.transcribe(&wav_path).await.map_err(|e| PipelineError::Enrichment(e.to_string()));
        let _ = tokio::fs::remove_file(&wav_path).await;
        text
    }
}

async fn download(http: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    use futures_util::StreamExt;

    let resp = http.get(url).send().await?;
    let mut stream = resp.bytes_stream();
    let mut file = tokio::fs::File::create(dest).await.map_err(PipelineError::Io)?;
    let mut wrote_any = false;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            wrote_any = true;
        }
        file.write_all(&chunk).await.map_err(PipelineError::Io)?;
    }
    if !wrote_any {
        return Err(PipelineError::Enrichment(format!("empty download from {url}")));
    }
    Ok(())
}

fn uuid_like_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{:x}-{:x}", std::process::id(), COUNTER.fetch_add(1, Ordering::Relaxed))
}
