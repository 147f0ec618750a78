use crate::coach::{Coach, DeliveryReport};
use crate::config_loader;
use crate::engine::PlaybackOutcome;
use crate::pipeline::{DemoPipeline, PlaybackStatus};
use crate::recorder::Recorder;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use zbus::interface;

pub struct VoiceCoachService {
    pub pipeline: Arc<DemoPipeline>,
    pub coach: Coach,
    pub recorder: Arc<Mutex<Recorder>>,
}

fn failed(e: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn audio_enabled() -> bool {
    config_loader::SETTINGS
        .read()
        .map(|s| s.enable_audio)
        .unwrap_or(true)
}

/// (state, last outcome, voice id, demo cached)
pub fn status_tuple(status: &PlaybackStatus) -> (String, String, String, bool) {
    let outcome = match status.last_outcome {
        Some(PlaybackOutcome::Ended) => "ended",
        Some(PlaybackOutcome::Stopped) => "stopped",
        None => "",
    };
    (
        status.state.as_str().to_string(),
        outcome.to_string(),
        status.voice_id.clone(),
        status.demo_cached,
    )
}

/// (score, pace, clarity, confidence, feedback)
pub fn report_tuple(report: DeliveryReport) -> (u8, u8, u8, u8, Vec<String>) {
    (
        report.score,
        report.pace,
        report.clarity,
        report.confidence,
        report.feedback,
    )
}

#[interface(name = "org.voicecoach.Service")]
impl VoiceCoachService {
    #[zbus(name = "Ping")]
    async fn ping(&self) -> String {
        "pong".to_string()
    }

    #[zbus(name = "GetVersion")]
    async fn get_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    /// (id, name, label) triples in catalog order.
    #[zbus(name = "ListVoices")]
    async fn list_voices(&self) -> Vec<(String, String, String)> {
        self.pipeline
            .voices()
            .iter()
            .map(|v| (v.id.to_string(), v.name.to_string(), v.label.to_string()))
            .collect()
    }

    #[zbus(name = "SelectVoice")]
    async fn select_voice(&self, voice_id: String) -> zbus::fdo::Result<()> {
        info!("Received select voice request: {}", voice_id);
        self.pipeline.select_voice(&voice_id).map_err(failed)
    }

    #[zbus(name = "GetSelectedVoice")]
    async fn get_selected_voice(&self) -> String {
        self.pipeline.selected_voice().id.to_string()
    }

    #[zbus(name = "SetScript")]
    async fn set_script(&self, text: String) {
        info!("Received script ({} chars)", text.chars().count());
        self.pipeline.set_script(&text);
    }

    #[zbus(name = "GetScript")]
    async fn get_script(&self) -> String {
        self.pipeline.script()
    }

    #[zbus(name = "ToggleDemo")]
    async fn toggle_demo(&self) -> zbus::fdo::Result<String> {
        if !audio_enabled() {
            return Err(failed("Audio output is disabled"));
        }
        let outcome = self.pipeline.toggle_demo().await.map_err(failed)?;
        info!("Toggle demo: {}", outcome.as_str());
        Ok(outcome.as_str().to_string())
    }

    #[zbus(name = "StopDemo")]
    async fn stop_demo(&self) -> bool {
        self.pipeline.stop_demo()
    }

    #[zbus(name = "PreviewVoice")]
    async fn preview_voice(&self, voice_id: String) -> zbus::fdo::Result<String> {
        if !audio_enabled() {
            return Err(failed("Audio output is disabled"));
        }
        let outcome = self.pipeline.preview_voice(&voice_id).await.map_err(failed)?;
        Ok(outcome.as_str().to_string())
    }

    #[zbus(name = "GetPlaybackStatus")]
    async fn get_playback_status(&self) -> (String, String, String, bool) {
        status_tuple(&self.pipeline.playback_status())
    }

    /// Writes the demonstration to `dir`, or the configured download directory when empty.
    #[zbus(name = "ExportDemo")]
    async fn export_demo(&self, dir: String) -> zbus::fdo::Result<String> {
        let dir = if dir.is_empty() {
            config_loader::SETTINGS
                .read()
                .map(|s| s.download_dir())
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            PathBuf::from(dir)
        };
        let path = self.pipeline.export_demo(&dir).map_err(failed)?;
        Ok(path.display().to_string())
    }

    /// Rewrites the current script and makes the result the new script.
    #[zbus(name = "OptimizeScript")]
    async fn optimize_script(&self) -> zbus::fdo::Result<String> {
        let script = self.pipeline.script();
        if script.trim().is_empty() {
            return Err(failed("No script to optimize"));
        }
        let optimized = self.coach.optimize_script(&script).await.map_err(failed)?;
        self.pipeline.set_script(&optimized);
        Ok(optimized)
    }

    /// Record the user reading the script, then have the take analyzed.
    #[zbus(name = "PracticeDelivery")]
    async fn practice_delivery(
        &self,
        duration_secs: u32,
    ) -> zbus::fdo::Result<(u8, u8, u8, u8, Vec<String>)> {
        let script = self.pipeline.script();
        if script.trim().is_empty() {
            return Err(failed("No script to practice"));
        }

        let duration_secs = if duration_secs == 0 {
            config_loader::SETTINGS
                .read()
                .map(|s| s.practice_record_secs)
                .unwrap_or(30)
        } else {
            u64::from(duration_secs)
        };
        info!("Received practice request ({}s)", duration_secs);

        // Don't talk over the speaker.
        self.pipeline.stop_demo();

        let recorder = self.recorder.clone();
        let recording = tokio::task::spawn_blocking(move || {
            let recorder = recorder.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            recorder.record(Duration::from_secs(duration_secs))
        })
        .await
        .map_err(|e| failed(format!("Error joining audio task: {}", e)))?
        .map_err(|e| {
            warn!("Practice recording failed: {}", e);
            failed(e)
        })?;

        let report = self
            .coach
            .analyze_delivery(&script, &recording)
            .await
            .map_err(failed)?;
        info!("Delivery score: {}", report.score);
        Ok(report_tuple(report))
    }
}
