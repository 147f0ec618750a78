use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Generative service
    pub api_base_url: String,
    pub api_key: String,
    pub tts_model: String,
    pub coach_model: String,
    pub request_timeout_secs: u64,
    // Demonstration voice
    pub default_voice: String,
    pub cache_text_prefix_chars: usize, // characters of the script sent for synthesis
    pub preview_text: String,
    // Playback
    pub enable_audio: bool,
    pub playback_poll_ms: u64,
    pub playback_volume: f32, // 0.0 - 1.0
    // Export / practice
    pub download_dir: String, // empty = user's download directory
    pub practice_record_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: String::new(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
            coach_model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 60,
            default_voice: "Kore".to_string(),
            cache_text_prefix_chars: 500,
            preview_text: "Hello! This is how your script will sound in my voice.".to_string(),
            enable_audio: true,
            playback_poll_ms: 20,
            playback_volume: 1.0,
            download_dir: String::new(),
            practice_record_secs: 30,
        }
    }
}

lazy_static! {
    pub static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Invalid configuration, using defaults: {}", e);
        Settings::default()
    }));
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let builder = Config::builder()
            .set_default("api_base_url", defaults.api_base_url)?
            .set_default("api_key", defaults.api_key)?
            .set_default("tts_model", defaults.tts_model)?
            .set_default("coach_model", defaults.coach_model)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("default_voice", defaults.default_voice)?
            .set_default(
                "cache_text_prefix_chars",
                defaults.cache_text_prefix_chars as u64,
            )?
            .set_default("preview_text", defaults.preview_text)?
            .set_default("enable_audio", defaults.enable_audio)?
            .set_default("playback_poll_ms", defaults.playback_poll_ms)?
            .set_default("playback_volume", f64::from(defaults.playback_volume))?
            .set_default("download_dir", defaults.download_dir)?
            .set_default("practice_record_secs", defaults.practice_record_secs)?
            // Merge with local config file (if exists)
            .add_source(File::with_name("VoiceCoach").required(false))
            .add_source(
                File::with_name(&Self::user_config_path().to_string_lossy()).required(false),
            )
            // Environment overrides, e.g. VOICECOACH_API_KEY
            .add_source(config::Environment::with_prefix("VOICECOACH"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voicecoach")
            .join("VoiceCoach")
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.playback_volume < 0.0 || self.playback_volume > 1.0 {
            return Err(config::ConfigError::Message(format!(
                "Invalid playback_volume: {}. Must be between 0.0 and 1.0",
                self.playback_volume
            )));
        }
        if self.cache_text_prefix_chars == 0 {
            return Err(config::ConfigError::Message(
                "cache_text_prefix_chars must be greater than 0".to_string(),
            ));
        }
        if self.playback_poll_ms == 0 {
            return Err(config::ConfigError::Message(
                "playback_poll_ms must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        // Not fatal: the pipeline falls back to the first catalog voice.
        if crate::voices::find(&self.default_voice).is_none() {
            tracing::warn!(
                "Unknown default_voice '{}', using '{}'",
                self.default_voice,
                crate::voices::default_voice().id
            );
        }
        Ok(())
    }

    /// Where exported demonstrations are written.
    pub fn download_dir(&self) -> PathBuf {
        if self.download_dir.is_empty() {
            dirs::download_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            PathBuf::from(&self.download_dir)
        }
    }
}
