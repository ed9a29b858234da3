use cq_domain::error::Result;

use crate::synth::SynthesisRequest;

/// The single language-model capability the orchestrator consumes.
///
/// Implementations are transport adapters (HTTP to a provider) or
/// in-process doubles; the runtime never sees anything richer than
/// prompt-in, text-out.
#[async_trait::async_trait]
pub trait CompletionPolicy: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Fabricates tool outputs from scenario guidance — the second use of the
/// LLM capability, kept behind its own seam so tests can pin results.
#[async_trait::async_trait]
pub trait ToolSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<serde_json::Value>;
}
