use std::error::Error;
use std::future::pending;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voicecoach::backends::gemini::GeminiSynthesizer;
use voicecoach::coach::Coach;
use voicecoach::config_loader;
use voicecoach::engine::PlaybackEngine;
use voicecoach::pipeline::{DemoPipeline, PipelineOptions};
use voicecoach::recorder::Recorder;
use voicecoach::service::VoiceCoachService;
use zbus::connection::Builder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = config_loader::SETTINGS
        .read()
        .map(|s| s.clone())
        .unwrap_or_default();
    if let Err(e) = settings.validate() {
        warn!("Configuration problem: {}", e);
    }
    if settings.api_key.is_empty() {
        warn!("No api_key configured; generation requests will be rejected");
    }

    let synthesizer = Arc::new(GeminiSynthesizer::from_settings(&settings));
    let pipeline = Arc::new(DemoPipeline::new(
        synthesizer,
        PlaybackEngine::global(),
        PipelineOptions::from_settings(&settings),
    ));

    let _conn = Builder::session()?
        .name("org.voicecoach.Service")?
        .serve_at(
            "/org/voicecoach/Service",
            VoiceCoachService {
                pipeline,
                coach: Coach::from_settings(&settings),
                recorder: Arc::new(Mutex::new(Recorder::new())),
            },
        )?
        .build()
        .await?;

    info!("VoiceCoach service running at org.voicecoach.Service");

    pending::<()>().await;

    Ok(())
}
