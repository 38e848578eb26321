use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::Result;

/// The media kinds an inbound transport webhook can carry (spec §4.9).
#[derive(Debug, Clone)]
pub enum InboundMedia {
    None,
    Image { url: String, caption: Option<String> },
    Document { url: String, file_name: String },
    Audio { url: String },
}

/// A transport-decoded message, prior to enrichment.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    pub inbox_id: i64,
    pub sender_phone: String,
    pub sender_name: String,
    pub media: InboundMedia,
    pub body: String,
}

/// Summarizes an image via an LLM vision call. Injected so C9 doesn't
/// depend on a specific provider (mirrors `hub-transcribe::SttClient`).
#[async_trait]
pub trait ImageSummarizer: Send + Sync {
    async fn summarize(&self, image_url: &str, caption: Option<&str>) -> Result<String>;
}

/// Converts an office document (DOCX/XLSX/PPTX) to text suitable for an
/// LLM summary — spec's "convert (DOCX/XLSX→HTML→PDF) then LLM summary"
/// collapsed to a single trait boundary; the conversion pipeline itself
/// is an external collaborator, not reimplemented here.
#[async_trait]
pub trait DocumentSummarizer: Send + Sync {
    async fn summarize(&self, document_url: &str, file_name: &str) -> Result<String>;
}

/// Transcribes a voice note. Distinct from `hub-transcribe::SttClient`:
/// that one transcribes CRM call recordings, this one transcribes chat
/// voice messages — different source, same shape.
#[async_trait]
pub trait VoiceTranscriber: Send + Sync {
    async fn transcribe(&self, audio_url: &str) -> Result<String>;
}

/// Enriches a canonical message's body in place of its raw media
/// reference (spec §4.9). Each enrichment failure degrades to a plain
/// link rather than dropping the message.
#[instrument(skip(message, images, documents, voice))]
pub async fn enrich(
    mut message: CanonicalMessage,
    images: &dyn ImageSummarizer,
    documents: &dyn DocumentSummarizer,
    voice: &dyn VoiceTranscriber,
) -> CanonicalMessage {
    message.body = match &message.media {
        InboundMedia::None => message.body.clone(),
        InboundMedia::Image { url, caption } => match images.summarize(url, caption.as_deref()).await {
            Ok(summary) => format!("[СООБЩЕНИЕ С ИЗОБРАЖЕНИЕМ]\n{summary}"),
            Err(e) => {
                warn!(error = %e, "image summarization failed");
                format!("[СООБЩЕНИЕ С ИЗОБРАЖЕНИЕМ]\n{url}")
            }
        },
        InboundMedia::Document { url, file_name } => match documents.summarize(url, file_name).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "document summarization failed");
                format!("{file_name}: {url}")
            }
        },
        InboundMedia::Audio { url } => match voice.transcribe(url).await {
            Ok(text) => format!(
                "🎤 Голосовое сообщение:\nСсылка на файл c аудио: {url}\n\n[Транскрибация]:\n{text}"
            ),
            Err(e) => {
                warn!(error = %e, "voice transcription failed");
                format!("{url}")
            }
        },
    };
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct Always(&'static str);

    #[async_trait]
    impl ImageSummarizer for Always {
        async fn summarize(&self, _url: &str, _caption: Option<&str>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }
    #[async_trait]
    impl DocumentSummarizer for Always {
        async fn summarize(&self, _url: &str, _file_name: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }
    #[async_trait]
    impl VoiceTranscriber for Always {
        async fn transcribe(&self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl VoiceTranscriber for AlwaysFails {
        async fn transcribe(&self, _url: &str) -> Result<String> {
            Err(PipelineError::Enrichment("boom".to_string()))
        }
    }

    fn message(media: InboundMedia) -> CanonicalMessage {
        CanonicalMessage {
            inbox_id: 1,
            sender_phone: "+79990000000".to_string(),
            sender_name: "Клиент".to_string(),
            media,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn image_summary_is_tagged() {
        let enriched = enrich(
            message(InboundMedia::Image { url: "https://x/y.jpg".to_string(), caption: None }),
            &Always("кот на диване"),
            &Always("n/a"),
            &Always("n/a"),
        )
        .await;
        assert!(enriched.body.starts_with("[СООБЩЕНИЕ С ИЗОБРАЖЕНИЕМ]"));
        assert!(enriched.body.contains("кот на диване"));
    }

    #[tokio::test]
    async fn failed_voice_transcription_falls_back_to_bare_url() {
        let enriched = enrich(
            message(InboundMedia::Audio { url: "https://x/voice.ogg".to_string() }),
            &Always("n/a"),
            &Always("n/a"),
            &AlwaysFails,
        )
        .await;
        assert_eq!(enriched.body, "https://x/voice.ogg");
    }
}
