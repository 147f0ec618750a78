//! Generative Language REST API client shared by synthesis and coaching.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{SpeechSynthesizer, SynthesisRequest};
use crate::config_loader::Settings;
use crate::error::GenerationError;

#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    "Failed to build HTTP client with {:?} timeout ({}), using defaults",
                    timeout, e
                );
                reqwest::Client::default()
            }
        };
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.api_base_url,
            &settings.api_key,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// POST `body` to `models/{model}:generateContent` and return the JSON response.
    pub async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, GenerationError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Generative service returned {}: {}", status, body);
            return Err(GenerationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json::<Value>().await?)
    }
}

/// Parts of the first candidate, which is all we ever request.
pub fn candidate_parts(response: &Value) -> &[Value] {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Concatenated text parts of the first candidate.
pub fn candidate_text(response: &Value) -> Option<String> {
    let text: String = candidate_parts(response)
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub struct GeminiSynthesizer {
    client: GeminiClient,
    model: String,
}

impl GeminiSynthesizer {
    pub fn new(client: GeminiClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(GeminiClient::from_settings(settings), &settings.tts_model)
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSynthesizer {
    fn id(&self) -> &'static str {
        "gemini"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, GenerationError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": request.text }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": request.voice_id }
                    }
                }
            }
        });

        let response = self.client.generate_content(&self.model, &body).await?;
        candidate_parts(&response)
            .iter()
            .find_map(|p| p["inlineData"]["data"].as_str())
            .filter(|data| !data.is_empty())
            .map(str::to_string)
            .ok_or(GenerationError::MissingAudio)
    }
}
