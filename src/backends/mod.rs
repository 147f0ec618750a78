pub mod gemini;

use async_trait::async_trait;

use crate::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
}

/// Trait that every speech synthesis collaborator implements.
/// The pipeline only sees base64 PCM16LE mono 24 kHz audio coming back.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns the unique ID of the backend (e.g., "gemini")
    fn id(&self) -> &'static str;

    /// Returns the synthesized audio as base64 encoded raw PCM16LE samples.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, GenerationError>;
}
