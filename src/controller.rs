use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::asset::AudioAsset;
use crate::decoder;
use crate::engine::{Callback, PlaybackEngine, PlaybackHandle, PlaybackOutcome};
use crate::error::PipelineError;

/// Observable state of the current session.
///
/// `Ended` and `Stopped` are momentary: the controller reports `Idle` as soon as
/// a session finishes, and [`PlaybackController::last_outcome`] tells how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
        }
    }
}

/// Owns "the current demonstration playback". At most one session is playing.
pub struct PlaybackController {
    engine: Arc<PlaybackEngine>,
    current: Mutex<Option<PlaybackHandle>>,
}

impl PlaybackController {
    pub fn new(engine: Arc<PlaybackEngine>) -> Self {
        Self {
            engine,
            current: Mutex::new(None),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<PlaybackHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace whatever is playing with `asset`.
    ///
    /// The previous session is stopped before the new one is decoded, so its
    /// completion callback can no longer fire. On error the controller is idle.
    pub fn play(&self, asset: &AudioAsset, on_ended: Option<Callback>) -> Result<(), PipelineError> {
        let mut current = self.current();
        if let Some(previous) = current.take() {
            if previous.stop() {
                debug!("Session {} superseded", previous.id());
            }
        }

        let buffer = decoder::decode(asset.pcm_base64())?;
        let duration = buffer.duration();
        let voice_id = asset.voice_id().to_string();
        let finished: Callback = Box::new(move || {
            info!("'{}' playback finished", voice_id);
            if let Some(callback) = on_ended {
                callback();
            }
        });
        let handle = self.engine.render_buffer(buffer, Some(finished))?;
        info!(
            "Playing {:.1}s of '{}' audio (session {})",
            duration.as_secs_f32(),
            asset.voice_id(),
            handle.id()
        );
        *current = Some(handle);
        Ok(())
    }

    /// Stop the current session if it is playing. Returns whether anything stopped.
    pub fn stop(&self) -> bool {
        let current = self.current();
        match current.as_ref() {
            Some(handle) if handle.stop() => {
                info!("Session {} stopped", handle.id());
                true
            }
            _ => false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match self.current().as_ref() {
            Some(handle) if handle.is_playing() => PlaybackState::Playing,
            _ => PlaybackState::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// How the most recent session finished, `None` while it plays or before any session.
    pub fn last_outcome(&self) -> Option<PlaybackOutcome> {
        self.current().as_ref().and_then(PlaybackHandle::outcome)
    }
}
