//! Script optimization and delivery analysis, delegated to the generative service.
//!
//! Both calls are opaque request/response pairs: the wording of the instructions
//! is not part of any contract, only the shape of what comes back.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::backends::gemini::{candidate_text, GeminiClient};
use crate::config_loader::Settings;
use crate::error::GenerationError;

const OPTIMIZE_INSTRUCTION: &str = "Rewrite the following script so it is clear, engaging and easy to \
read aloud. Keep the original meaning and language. Reply with the rewritten script only.";

const ANALYZE_INSTRUCTION: &str = "You are a public speaking coach. Listen to the recording of the \
speaker reading the script below and rate the delivery. Reply with JSON containing integer scores \
from 0 to 100 for \"score\", \"pace\", \"clarity\" and \"confidence\", and a \"feedback\" array of \
short suggestions.";

#[derive(Debug, Error)]
pub enum CoachError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("coach returned an empty answer")]
    EmptyAnswer,

    #[error("coach returned an unreadable report: {0}")]
    InvalidReport(#[from] serde_json::Error),
}

/// Structured judgment of one practice recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryReport {
    #[serde(deserialize_with = "percent")]
    pub score: u8,
    #[serde(deserialize_with = "percent")]
    pub pace: u8,
    #[serde(deserialize_with = "percent")]
    pub clarity: u8,
    #[serde(deserialize_with = "percent")]
    pub confidence: u8,
    pub feedback: Vec<String>,
}

/// Any JSON number, rounded and clamped to 0..=100.
fn percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.is_nan() {
        return Ok(0);
    }
    Ok(value.round().clamp(0.0, 100.0) as u8)
}

#[derive(Clone)]
pub struct Coach {
    client: GeminiClient,
    model: String,
}

impl Coach {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(GeminiClient::from_settings(settings), &settings.coach_model)
    }

    pub async fn optimize_script(&self, script: &str) -> Result<String, CoachError> {
        info!("Coach: optimizing script ({} chars)", script.chars().count());
        let body = json!({
            "contents": [{ "parts": [{ "text": format!("{}\n\n{}", OPTIMIZE_INSTRUCTION, script) }] }]
        });
        let response = self.client.generate_content(&self.model, &body).await?;
        candidate_text(&response)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(CoachError::EmptyAnswer)
    }

    /// Rate a recorded reading of `script`. `recording` is a complete WAV file.
    pub async fn analyze_delivery(
        &self,
        script: &str,
        recording: &[u8],
    ) -> Result<DeliveryReport, CoachError> {
        info!("Coach: analyzing {} bytes of recorded audio", recording.len());
        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "audio/wav", "data": STANDARD.encode(recording) } },
                    { "text": format!("{}\n\nScript:\n{}", ANALYZE_INSTRUCTION, script) }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });
        let response = self.client.generate_content(&self.model, &body).await?;
        let text = candidate_text(&response).ok_or(CoachError::EmptyAnswer)?;
        Ok(serde_json::from_str(strip_code_fence(&text))?)
    }
}

/// Models sometimes wrap JSON in a markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::time::Duration;

    fn coach(server: &mockito::ServerGuard) -> Coach {
        Coach::new(
            GeminiClient::new(&server.url(), "k", Duration::from_secs(5)),
            "coach-model",
        )
    }

    fn text_response(text: &str) -> String {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
    }

    #[tokio::test]
    async fn test_optimize_returns_trimmed_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1beta/models/coach-model:generateContent")
            .with_status(200)
            .with_body(text_response("  A sharper opening line.\n"))
            .create_async()
            .await;

        let text = coach(&server).optimize_script("an opening line").await.unwrap();
        assert_eq!(text, "A sharper opening line.");
    }

    #[tokio::test]
    async fn test_analyze_parses_fenced_report() {
        let mut server = mockito::Server::new_async().await;
        let report = r#"```json
{"score": 82, "pace": 70, "clarity": 90, "confidence": 75, "feedback": ["Slow down in the intro"]}
```"#;
        let mock = server
            .mock("POST", Matcher::Any)
            .match_body(Matcher::Regex("audio/wav".to_string()))
            .with_status(200)
            .with_body(text_response(report))
            .create_async()
            .await;

        let got = coach(&server)
            .analyze_delivery("script", b"RIFF....WAVE")
            .await
            .unwrap();
        assert_eq!(got.score, 82);
        assert_eq!(got.clarity, 90);
        assert_eq!(got.feedback, vec!["Slow down in the intro".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_analyze_rejects_non_json() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(text_response("Great job!"))
            .create_async()
            .await;

        let err = coach(&server).analyze_delivery("s", b"x").await.unwrap_err();
        assert!(matches!(err, CoachError::InvalidReport(_)));
    }

    #[test]
    fn test_report_scores_are_clamped() {
        let report: DeliveryReport = serde_json::from_str(
            r#"{"score": 82.5, "pace": 101, "clarity": -4, "confidence": 7.2, "feedback": []}"#,
        )
        .unwrap();
        assert_eq!(report.score, 83);
        assert_eq!(report.pace, 100);
        assert_eq!(report.clarity, 0);
        assert_eq!(report.confidence, 7);

        let partial: DeliveryReport = serde_json::from_str(r#"{"score": 55}"#).unwrap();
        assert_eq!(partial.score, 55);
        assert_eq!(partial.pace, 0);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }
}
