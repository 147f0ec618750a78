//! Process-wide audio output.
//!
//! The output stream must live on a single thread, so the engine owns a dedicated
//! `playback-engine` thread that opens the device, starts voices and watches them
//! for natural completion. Everything else talks to that thread through commands.
//!
//! The global engine is created on first use and is never torn down; the thread and
//! the device live until process exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, error, info, warn};

use crate::config_loader;
use crate::decoder::SampleBuffer;
use crate::error::PlaybackError;

pub type Callback = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL_ENGINE: OnceLock<Arc<PlaybackEngine>> = OnceLock::new();

/// How a session finished. Exactly one outcome is recorded per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Ended,
    Stopped,
}

/// A sound currently rendering on the device.
pub trait ActiveVoice {
    fn is_finished(&self) -> bool;
    fn halt(&mut self);
}

/// An audio output the engine thread can render into.
///
/// Implementations are created and used on the engine thread only, so they need
/// not be `Send`.
pub trait OutputDevice {
    /// Make sure the device is open and running, re-opening it if needed.
    fn resume(&mut self) -> Result<(), PlaybackError>;

    fn start(&mut self, buffer: SampleBuffer) -> Result<Box<dyn ActiveVoice>, PlaybackError>;
}

#[derive(Default)]
struct SessionState {
    outcome: Option<PlaybackOutcome>,
    on_ended: Option<Callback>,
    notified: bool,
}

struct Session {
    id: u64,
    state: Mutex<SessionState>,
    commands: Sender<Command>,
    notify: Sender<Callback>,
}

impl Session {
    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome if none is recorded yet. Returns whether this call won.
    fn settle(&self, outcome: PlaybackOutcome) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        state.outcome = Some(outcome);
        if outcome == PlaybackOutcome::Stopped {
            state.on_ended = None;
        }
        true
    }

    /// Hand out the completion callback once the session has ended naturally.
    fn take_ended_callback(&self) -> Option<Callback> {
        let mut state = self.lock();
        if state.outcome != Some(PlaybackOutcome::Ended) || state.notified {
            return None;
        }
        let callback = state.on_ended.take();
        state.notified = callback.is_some();
        callback
    }
}

/// Cancellation token for one rendering session.
#[derive(Clone)]
pub struct PlaybackHandle {
    session: Arc<Session>,
}

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.session.id
    }

    /// Stop the session. A no-op once the session has ended or was already stopped.
    ///
    /// Returns `true` only for the call that actually stopped playback.
    pub fn stop(&self) -> bool {
        if !self.session.settle(PlaybackOutcome::Stopped) {
            return false;
        }
        // The engine thread may already be gone at process exit; nothing left to halt then.
        let _ = self.session.commands.send(Command::Halt(self.session.id));
        debug!("Playback session {} stopped", self.session.id);
        true
    }

    /// Register the natural-completion notification.
    ///
    /// Fires exactly once if the session ends on its own, right away when it
    /// already has. Never fires for a stopped session. A second registration
    /// before the end replaces the first. Callbacks always run on the
    /// `playback-notify` thread, never on the caller's.
    pub fn on_ended<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.session.lock();
        match state.outcome {
            None => state.on_ended = Some(Box::new(callback)),
            Some(PlaybackOutcome::Ended) if !state.notified => {
                state.notified = true;
                drop(state);
                let _ = self.session.notify.send(Box::new(callback));
            }
            Some(_) => {}
        }
    }

    pub fn outcome(&self) -> Option<PlaybackOutcome> {
        self.session.lock().outcome
    }

    pub fn is_playing(&self) -> bool {
        self.outcome().is_none()
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.session.id)
            .field("outcome", &self.outcome())
            .finish()
    }
}

enum Command {
    Render {
        session: Arc<Session>,
        buffer: SampleBuffer,
        reply: Sender<Result<(), PlaybackError>>,
    },
    Halt(u64),
}

pub struct PlaybackEngine {
    commands: Sender<Command>,
    notify: Sender<Callback>,
    next_session: AtomicU64,
}

impl PlaybackEngine {
    /// The process-wide engine backed by the default output device.
    pub fn global() -> Arc<Self> {
        GLOBAL_ENGINE
            .get_or_init(|| {
                let (poll_ms, volume) = config_loader::SETTINGS
                    .read()
                    .map(|s| (s.playback_poll_ms, s.playback_volume))
                    .unwrap_or((20, 1.0));
                info!("Initializing playback engine");
                Arc::new(Self::with_device(
                    move || RodioDevice::new(volume),
                    Duration::from_millis(poll_ms),
                ))
            })
            .clone()
    }

    /// Spawn an engine thread driving the device built by `factory`.
    ///
    /// `poll_interval` bounds how late a natural completion is noticed.
    pub fn with_device<D, F>(factory: F, poll_interval: Duration) -> Self
    where
        D: OutputDevice + 'static,
        F: FnOnce() -> D + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Command>();
        let (notify_tx, notify_rx) = mpsc::channel::<Callback>();

        // Completion callbacks run here so they can start new sessions without
        // waiting on the engine thread that is delivering them.
        let notifier = thread::Builder::new()
            .name("playback-notify".into())
            .spawn(move || {
                while let Ok(callback) = notify_rx.recv() {
                    callback();
                }
            });
        if let Err(e) = notifier {
            error!("Failed to spawn playback notifier thread: {}", e);
        }

        let engine = thread::Builder::new()
            .name("playback-engine".into())
            .spawn({
                let notify_tx = notify_tx.clone();
                move || {
                    let mut device = factory();
                    run_engine(&mut device, rx, notify_tx, poll_interval);
                    debug!("Playback engine thread exiting");
                }
            });
        if let Err(e) = engine {
            error!("Failed to spawn playback engine thread: {}", e);
        }

        Self {
            commands: tx,
            notify: notify_tx,
            next_session: AtomicU64::new(1),
        }
    }

    /// Start rendering `buffer`. Only the playback controller calls this, so two
    /// call sites can never start overlapping renders.
    ///
    /// `on_ended` is attached before the engine sees the session, so a sound that
    /// finishes during start-up still notifies exactly once.
    pub(crate) fn render_buffer(
        &self,
        buffer: SampleBuffer,
        on_ended: Option<Callback>,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let session = Arc::new(Session {
            id: self.next_session.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(SessionState {
                on_ended,
                ..SessionState::default()
            }),
            commands: self.commands.clone(),
            notify: self.notify.clone(),
        });

        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(Command::Render {
                session: session.clone(),
                buffer,
                reply: reply_tx,
            })
            .map_err(|_| engine_gone())?;
        reply_rx.recv().map_err(|_| engine_gone())??;

        Ok(PlaybackHandle { session })
    }
}

fn engine_gone() -> PlaybackError {
    PlaybackError::DeviceUnavailable("playback engine is not running".to_string())
}

fn run_engine<D: OutputDevice>(
    device: &mut D,
    commands: Receiver<Command>,
    notify: Sender<Callback>,
    poll_interval: Duration,
) {
    let mut active: HashMap<u64, (Arc<Session>, Box<dyn ActiveVoice>)> = HashMap::new();

    loop {
        match commands.recv_timeout(poll_interval) {
            Ok(Command::Render {
                session,
                buffer,
                reply,
            }) => {
                let result = device.resume().and_then(|()| device.start(buffer));
                match result {
                    Ok(voice) => {
                        debug!("Playback session {} started", session.id);
                        active.insert(session.id, (session, voice));
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        warn!("Playback session {} failed to start: {}", session.id, e);
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Ok(Command::Halt(id)) => {
                if let Some((_, mut voice)) = active.remove(&id) {
                    voice.halt();
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        active.retain(|id, (session, voice)| {
            if !voice.is_finished() {
                return true;
            }
            if session.settle(PlaybackOutcome::Ended) {
                debug!("Playback session {} ended", id);
                if let Some(callback) = session.take_ended_callback() {
                    let _ = notify.send(callback);
                }
            }
            false
        });
    }
}

/// Default output device through rodio.
pub struct RodioDevice {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    volume: f32,
}

impl RodioDevice {
    pub fn new(volume: f32) -> Self {
        Self {
            stream: None,
            volume,
        }
    }

    fn open(&mut self) -> Result<&OutputStreamHandle, PlaybackError> {
        if self.stream.is_none() {
            info!("Opening default audio output device");
            let stream = OutputStream::try_default()
                .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?;
            self.stream = Some(stream);
        }
        match &self.stream {
            Some((_, handle)) => Ok(handle),
            None => Err(PlaybackError::DeviceUnavailable("no output stream".into())),
        }
    }
}

impl OutputDevice for RodioDevice {
    fn resume(&mut self) -> Result<(), PlaybackError> {
        self.open().map(|_| ())
    }

    fn start(&mut self, buffer: SampleBuffer) -> Result<Box<dyn ActiveVoice>, PlaybackError> {
        let sink = match Sink::try_new(self.open()?) {
            Ok(sink) => sink,
            Err(e) => {
                // The stream went away underneath us (device unplugged, server
                // restarted); reopen once before giving up.
                warn!("Audio output stream lost ({}), reopening", e);
                self.stream = None;
                Sink::try_new(self.open()?)
                    .map_err(|e| PlaybackError::DeviceUnavailable(e.to_string()))?
            }
        };
        sink.set_volume(self.volume);
        sink.append(SamplesBuffer::new(
            buffer.channel_count,
            buffer.sample_rate_hz,
            buffer.samples,
        ));
        Ok(Box::new(RodioVoice { sink }))
    }
}

struct RodioVoice {
    sink: Sink,
}

impl ActiveVoice for RodioVoice {
    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn halt(&mut self) {
        self.sink.stop();
    }
}
