//! One user's rehearsal session: script, voice selection, demonstration audio.
//!
//! This is the only place that mutates the generation caches and the
//! single-flight guards; callers go through the operations below.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::asset::{self, AudioAsset};
use crate::backends::{SpeechSynthesizer, SynthesisRequest};
use crate::cache::{CacheKey, GenerationCache};
use crate::config_loader::Settings;
use crate::controller::{PlaybackController, PlaybackState};
use crate::engine::{PlaybackEngine, PlaybackOutcome};
use crate::error::{GenerationError, PipelineError, PlaybackError};
use crate::single_flight::SingleFlightGuard;
use crate::voices::{self, VoiceOption};
use crate::wav;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Flight {
    Demo,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Started,
    Stopped,
    /// A demonstration is already being generated.
    Busy,
    /// The voice or script changed while generating; the result was cached but not played.
    Superseded,
}

impl ToggleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleOutcome::Started => "started",
            ToggleOutcome::Stopped => "stopped",
            ToggleOutcome::Busy => "busy",
            ToggleOutcome::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewOutcome {
    Played,
    /// Another preview is being generated.
    Busy,
}

impl PreviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewOutcome::Played => "played",
            PreviewOutcome::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub last_outcome: Option<PlaybackOutcome>,
    pub voice_id: String,
    pub demo_cached: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub default_voice: String,
    pub text_prefix_chars: usize,
    pub preview_text: String,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_voice: settings.default_voice.clone(),
            text_prefix_chars: settings.cache_text_prefix_chars,
            preview_text: settings.preview_text.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

struct Selection {
    voice: &'static VoiceOption,
    script: String,
}

pub struct DemoPipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    controller: Arc<PlaybackController>,
    demos: GenerationCache,
    previews: GenerationCache,
    flights: SingleFlightGuard<Flight>,
    selection: Mutex<Selection>,
    options: PipelineOptions,
}

impl DemoPipeline {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        engine: Arc<PlaybackEngine>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            synthesizer,
            controller: Arc::new(PlaybackController::new(engine)),
            demos: GenerationCache::new(),
            previews: GenerationCache::new(),
            flights: SingleFlightGuard::new(),
            selection: Mutex::new(Selection {
                voice: voices::find(&options.default_voice).unwrap_or_else(voices::default_voice),
                script: String::new(),
            }),
            options,
        }
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn voices(&self) -> &'static [VoiceOption] {
        voices::catalog()
    }

    pub fn selected_voice(&self) -> &'static VoiceOption {
        self.selection().voice
    }

    /// Change the demonstration voice. Cached demonstrations are discarded when it changes.
    pub fn select_voice(&self, voice_id: &str) -> Result<(), PipelineError> {
        let voice =
            voices::find(voice_id).ok_or_else(|| PipelineError::UnknownVoice(voice_id.to_string()))?;
        let mut selection = self.selection();
        if selection.voice.id != voice.id {
            info!("Voice changed: {} -> {}", selection.voice.id, voice.id);
            self.demos.invalidate(selection.voice.id);
            selection.voice = voice;
        }
        Ok(())
    }

    pub fn script(&self) -> String {
        self.selection().script.clone()
    }

    /// Submit new source text. Cached demonstrations are discarded when it changes.
    pub fn set_script(&self, text: &str) {
        let mut selection = self.selection();
        if selection.script != text {
            debug!("Script updated ({} chars)", text.chars().count());
            selection.script = text.to_string();
            self.demos.clear();
        }
    }

    /// The text actually synthesized and the key it is cached under.
    fn demo_request(&self) -> Result<(SynthesisRequest, CacheKey), PipelineError> {
        let selection = self.selection();
        let text = asset::text_prefix(selection.script.trim(), self.options.text_prefix_chars);
        if text.is_empty() {
            return Err(PipelineError::EmptyScript);
        }
        let key = CacheKey::new(selection.voice.id, asset::hash_text(text));
        let request = SynthesisRequest {
            text: text.to_string(),
            voice_id: selection.voice.id.to_string(),
        };
        Ok((request, key))
    }

    async fn generate(&self, request: SynthesisRequest, key: &CacheKey) -> Result<AudioAsset, GenerationError> {
        info!(
            "Generating '{}' audio via {} ({} chars)",
            request.voice_id,
            self.synthesizer.id(),
            request.text.chars().count()
        );
        let pcm = self.synthesizer.synthesize(&request).await?;
        Ok(AudioAsset::new(pcm, key.voice_id.clone(), key.text_hash.clone())?)
    }

    /// Play/stop control for the demonstration voice.
    pub async fn toggle_demo(&self) -> Result<ToggleOutcome, PipelineError> {
        if self.controller.stop() {
            return Ok(ToggleOutcome::Stopped);
        }
        self.play_demo().await
    }

    /// Play the demonstration for the current script and voice, generating it if needed.
    pub async fn play_demo(&self) -> Result<ToggleOutcome, PipelineError> {
        let (request, key) = self.demo_request()?;

        let asset = match self.demos.get(&key) {
            Some(asset) => asset,
            None => {
                let flight = self.flights.run(Flight::Demo, || {
                    self.demos
                        .get_or_generate(&key, || self.generate(request, &key))
                });
                match flight.await {
                    Ok(result) => result?,
                    Err(_) => return Ok(ToggleOutcome::Busy),
                }
            }
        };

        // The selection may have moved on while we were waiting on the service.
        let (_, current_key) = self.demo_request()?;
        if current_key != key {
            warn!("Selection changed during generation, not playing stale audio");
            return Ok(ToggleOutcome::Superseded);
        }

        self.start_playback(asset).await?;
        Ok(ToggleOutcome::Started)
    }

    /// Hand `asset` to the controller off the async worker; opening the output
    /// device can block for a while on first use.
    async fn start_playback(&self, asset: Arc<AudioAsset>) -> Result<(), PipelineError> {
        let controller = self.controller.clone();
        tokio::task::spawn_blocking(move || controller.play(&asset, None))
            .await
            .map_err(|e| PlaybackError::DeviceUnavailable(format!("playback task failed: {}", e)))?
    }

    pub fn stop_demo(&self) -> bool {
        self.controller.stop()
    }

    /// Play a short sample sentence in `voice_id`. One preview generation at a time.
    pub async fn preview_voice(&self, voice_id: &str) -> Result<PreviewOutcome, PipelineError> {
        let voice =
            voices::find(voice_id).ok_or_else(|| PipelineError::UnknownVoice(voice_id.to_string()))?;
        let text = self.options.preview_text.clone();
        let key = CacheKey::new(voice.id, asset::hash_text(&text));
        let request = SynthesisRequest {
            text,
            voice_id: voice.id.to_string(),
        };

        let flight = self.flights.run(Flight::Preview, || async {
            let asset = self
                .previews
                .get_or_generate(&key, || self.generate(request, &key))
                .await?;
            self.start_playback(asset).await?;
            Ok::<_, PipelineError>(())
        });

        match flight.await {
            Ok(result) => result.map(|()| PreviewOutcome::Played),
            Err(_) => Ok(PreviewOutcome::Busy),
        }
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        let voice_id = self.selected_voice().id.to_string();
        let demo_cached = self
            .demo_request()
            .map(|(_, key)| self.demos.get(&key).is_some())
            .unwrap_or(false);
        PlaybackStatus {
            state: self.controller.state(),
            last_outcome: self.controller.last_outcome(),
            voice_id,
            demo_cached,
        }
    }

    /// Write the cached demonstration for the current selection as a WAV download.
    pub fn export_demo(&self, dir: &Path) -> Result<PathBuf, PipelineError> {
        let (_, key) = self.demo_request()?;
        let asset = self.demos.get(&key).ok_or(PipelineError::NoDemoAudio)?;
        let path = wav::write_download(dir, &asset, Local::now().naive_local())?;
        info!("Exported demonstration to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::SampleBuffer;
    use crate::engine::testing::{scripted_engine, ScriptedDevice};
    use crate::engine::{ActiveVoice, OutputDevice};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Returns `len` bytes of silence, optionally waiting for a release first.
    struct FakeSynth {
        calls: AtomicUsize,
        requests: Mutex<Vec<SynthesisRequest>>,
        gate: Option<Arc<Notify>>,
        len: usize,
    }

    impl FakeSynth {
        fn new(len: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                gate: None,
                len,
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynth {
        fn id(&self) -> &'static str {
            "fake"
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(STANDARD.encode(vec![0u8; self.len]))
        }
    }

    fn pipeline(synth: Arc<FakeSynth>, prefix: usize) -> (DemoPipeline, ScriptedDevice) {
        let (engine, device) = scripted_engine();
        let options = PipelineOptions {
            default_voice: "Kore".to_string(),
            text_prefix_chars: prefix,
            preview_text: "Preview sample.".to_string(),
        };
        (DemoPipeline::new(synth, Arc::new(engine), options), device)
    }

    #[tokio::test]
    async fn test_toggle_starts_then_stops() {
        let synth = Arc::new(FakeSynth::new(8));
        let (pipeline, device) = pipeline(synth.clone(), 500);
        pipeline.set_script("Thank you all for coming.");

        assert_eq!(pipeline.toggle_demo().await.unwrap(), ToggleOutcome::Started);
        assert_eq!(pipeline.playback_status().state, PlaybackState::Playing);
        assert_eq!(pipeline.toggle_demo().await.unwrap(), ToggleOutcome::Stopped);
        assert_eq!(pipeline.playback_status().state, PlaybackState::Idle);

        // Replay comes from the cache.
        assert_eq!(pipeline.toggle_demo().await.unwrap(), ToggleOutcome::Started);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.started(), 2);
    }

    #[tokio::test]
    async fn test_empty_script_is_rejected() {
        let (pipeline, _device) = pipeline(Arc::new(FakeSynth::new(2)), 500);
        pipeline.set_script("   ");
        assert!(matches!(
            pipeline.toggle_demo().await,
            Err(PipelineError::EmptyScript)
        ));
    }

    #[tokio::test]
    async fn test_synthesis_uses_configured_prefix() {
        let synth = Arc::new(FakeSynth::new(2));
        let (pipeline, _device) = pipeline(synth.clone(), 5);
        pipeline.set_script("Hello world");
        pipeline.play_demo().await.unwrap();

        let requests = synth.requests.lock().unwrap();
        assert_eq!(requests[0].text, "Hello");
        assert_eq!(requests[0].voice_id, "Kore");
    }

    #[tokio::test]
    async fn test_voice_change_invalidates_and_regenerates() {
        let synth = Arc::new(FakeSynth::new(4));
        let (pipeline, _device) = pipeline(synth.clone(), 500);
        pipeline.set_script("Same words.");
        pipeline.play_demo().await.unwrap();

        pipeline.select_voice("Charon").unwrap();
        assert!(!pipeline.playback_status().demo_cached);
        pipeline.play_demo().await.unwrap();
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);

        // Re-selecting the same voice keeps the cache.
        pipeline.select_voice("Charon").unwrap();
        assert!(pipeline.playback_status().demo_cached);
        assert!(matches!(
            pipeline.select_voice("Nobody"),
            Err(PipelineError::UnknownVoice(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_generation_is_not_played() {
        let gate = Arc::new(Notify::new());
        let synth = Arc::new(FakeSynth {
            gate: Some(gate.clone()),
            ..FakeSynth::new(4)
        });
        let (pipeline, device) = pipeline(synth.clone(), 500);
        pipeline.set_script("Version one.");

        let play = pipeline.play_demo();
        tokio::pin!(play);
        tokio::select! {
            biased;
            _ = &mut play => panic!("generation should be waiting"),
            _ = tokio::task::yield_now() => {}
        }

        // A second request while generating is declined.
        assert_eq!(pipeline.toggle_demo().await.unwrap(), ToggleOutcome::Busy);

        pipeline.set_script("Version two.");
        gate.notify_one();
        assert_eq!(play.await.unwrap(), ToggleOutcome::Superseded);
        assert_eq!(device.started(), 0);
    }

    #[test]
    fn test_configured_default_voice() {
        let (engine, _device) = scripted_engine();
        let options = PipelineOptions {
            default_voice: "Aoede".to_string(),
            ..PipelineOptions::default()
        };
        let pipeline = DemoPipeline::new(Arc::new(FakeSynth::new(2)), Arc::new(engine), options);
        assert_eq!(pipeline.selected_voice().id, "Aoede");

        let (engine, _device) = scripted_engine();
        let options = PipelineOptions {
            default_voice: "Nobody".to_string(),
            ..PipelineOptions::default()
        };
        let pipeline = DemoPipeline::new(Arc::new(FakeSynth::new(2)), Arc::new(engine), options);
        assert_eq!(pipeline.selected_voice().id, "Kore");
    }

    /// Takes a while to come up, like a sound server on first connect.
    struct SlowOpenDevice {
        opened: Arc<AtomicBool>,
    }

    struct Held;

    impl ActiveVoice for Held {
        fn is_finished(&self) -> bool {
            false
        }

        fn halt(&mut self) {}
    }

    impl OutputDevice for SlowOpenDevice {
        fn resume(&mut self) -> Result<(), PlaybackError> {
            std::thread::sleep(Duration::from_millis(200));
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn start(&mut self, _buffer: SampleBuffer) -> Result<Box<dyn ActiveVoice>, PlaybackError> {
            Ok(Box::new(Held))
        }
    }

    #[tokio::test]
    async fn test_device_open_does_not_stall_runtime() {
        let opened = Arc::new(AtomicBool::new(false));
        let flag = opened.clone();
        let engine = PlaybackEngine::with_device(
            move || SlowOpenDevice { opened: flag },
            Duration::from_millis(2),
        );
        let pipeline = DemoPipeline::new(
            Arc::new(FakeSynth::new(4)),
            Arc::new(engine),
            PipelineOptions::default(),
        );
        pipeline.set_script("Slow start.");

        // On a single-threaded runtime the timer only fires early if playback yielded.
        let (outcome, opened_before_timer) = tokio::join!(pipeline.play_demo(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            opened.load(Ordering::SeqCst)
        });
        assert_eq!(outcome.unwrap(), ToggleOutcome::Started);
        assert!(!opened_before_timer);
        assert!(opened.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_export_requires_cached_demo() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _device) = pipeline(Arc::new(FakeSynth::new(6)), 500);
        pipeline.set_script("Closing remarks.");
        assert!(matches!(
            pipeline.export_demo(dir.path()),
            Err(PipelineError::NoDemoAudio)
        ));

        pipeline.play_demo().await.unwrap();
        let path = pipeline.export_demo(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("ai_voice_") && name.ends_with(".wav"));
        assert_eq!(name.len(), "ai_voice_".len() + 14 + ".wav".len());
        assert_eq!(std::fs::read(path).unwrap().len(), 44 + 6);
    }

    #[tokio::test]
    async fn test_preview_plays_and_is_cached_separately() {
        let synth = Arc::new(FakeSynth::new(4));
        let (pipeline, device) = pipeline(synth.clone(), 500);

        assert_eq!(
            pipeline.preview_voice("Puck").await.unwrap(),
            PreviewOutcome::Played
        );
        assert_eq!(
            pipeline.preview_voice("Puck").await.unwrap(),
            PreviewOutcome::Played
        );
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(device.started(), 2);
        assert!(device.voice(0).halted.load(Ordering::SeqCst));

        // Script edits leave previews alone.
        pipeline.set_script("Anything");
        pipeline.preview_voice("Puck").await.unwrap();
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_preview_is_busy() {
        let gate = Arc::new(Notify::new());
        let synth = Arc::new(FakeSynth {
            gate: Some(gate.clone()),
            ..FakeSynth::new(4)
        });
        let (pipeline, _device) = pipeline(synth.clone(), 500);

        let first = pipeline.preview_voice("Aoede");
        tokio::pin!(first);
        tokio::select! {
            biased;
            _ = &mut first => panic!("preview should be waiting"),
            _ = tokio::task::yield_now() => {}
        }

        assert_eq!(
            pipeline.preview_voice("Fenrir").await.unwrap(),
            PreviewOutcome::Busy
        );
        gate.notify_one();
        assert_eq!(first.await.unwrap(), PreviewOutcome::Played);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }
}
