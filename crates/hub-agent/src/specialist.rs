use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::provider::{ChatRequest, LlmProvider, Message};

/// The seven specialist roles handed off to from the router (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialistKind {
    General,
    Design,
    Manager,
    Mortgage,
    ProductHelper,
    ProductPicker,
    Warmup,
}

impl SpecialistKind {
    pub const ALL: [SpecialistKind; 7] = [
        SpecialistKind::General,
        SpecialistKind::Design,
        SpecialistKind::Manager,
        SpecialistKind::Mortgage,
        SpecialistKind::ProductHelper,
        SpecialistKind::ProductPicker,
        SpecialistKind::Warmup,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SpecialistKind::General => "general",
            SpecialistKind::Design => "design",
            SpecialistKind::Manager => "manager",
            SpecialistKind::Mortgage => "mortgage",
            SpecialistKind::ProductHelper => "product_helper",
            SpecialistKind::ProductPicker => "product_picker",
            SpecialistKind::Warmup => "warmup",
        }
    }
}

pub struct SpecialistAgent {
    pub kind: SpecialistKind,
    pub system_prompt: String,
    pub model: String,
    pub provider: Arc<dyn LlmProvider>,
}

impl SpecialistAgent {
    /// A handoff strips the router's own tool traces: only the
    /// conversation history plus this specialist's system prompt go to
    /// the model, no router scratch output (spec §4.10 "handoff filter").
    #[instrument(skip(self, history), fields(specialist = self.kind.label()))]
    pub async fn reply(&self, history: &[Message]) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: self.system_prompt.clone(),
            messages: history.to_vec(),
            max_tokens: 1024,
        };
        let resp = self.provider.send(&req).await?;
        Ok(resp.content)
    }
}
