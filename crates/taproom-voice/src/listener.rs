//! **Listening Controller** — bounded speech capture with exactly one terminal
//! transcript per session.
//!
//! Session lifecycle: `Idle → Capturing → Finalizing → Idle`.
//!
//! ```text
//!  start ──► Capturing ──(capture timer)──► Finalizing ──(grace timer)──► finalize
//!               │                               │
//!               ├── recognizer final / error ───┼──► finalize
//!               └── stop_listening ─────────────┘
//! ```
//!
//! Five triggers race to finish a session. Every timer and recognizer signal is
//! tagged with its session id, and finalization first wins the session's
//! [`FinalizeGuard`]; whatever arrives afterwards is dropped.

use crate::audio::{AudioChunk, AudioSource, CaptureHandle};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Listening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// How long the microphone stays open (default 5000ms).
    pub max_duration_ms: u64,
    /// How long to wait for a late final result after the microphone closes (default 1500ms).
    pub grace_ms: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 5000,
            grace_ms: 1500,
        }
    }
}

impl ListenConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Terminal outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Trimmed, non-empty text.
    Text(String),
    /// Nothing intelligible was captured.
    Empty,
}

impl Transcript {
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Transcript::Empty
        } else {
            Transcript::Text(trimmed.to_string())
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Transcript::Text(t) => Some(t),
            Transcript::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Transcript::Empty)
    }
}

/// Events delivered to the host, in order. A session produces any number of
/// `Partial`s followed by exactly one `Final`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    Partial(String),
    Final(Transcript),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenPhase {
    #[default]
    Idle,
    /// Microphone open, recognizer streaming.
    Capturing,
    /// Microphone closed, waiting for the recognizer's last word.
    Finalizing,
}

/// Observable controller state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListenerStatus {
    pub phase: ListenPhase,
    /// Latest partial transcript of the current (or last) session.
    pub transcript: String,
    pub last_error: Option<String>,
}

impl ListenerStatus {
    pub fn is_listening(&self) -> bool {
        self.phase != ListenPhase::Idle
    }
}

/// Why recognition failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// The utterance contained no speech. Treated as an empty result.
    NoSpeech,
    Failed(String),
}

/// What a recognizer reports while a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    Partial(String),
    Final(String),
    Error(RecognitionError),
}

/// Streaming speech recognizer.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Checked before every session; `false` aborts before capture begins.
    fn is_available(&self) -> bool {
        true
    }

    /// Consume audio until the channel closes (microphone released), reporting
    /// results on `events`. The task may be aborted at any point.
    async fn recognize(
        &self,
        audio: mpsc::UnboundedReceiver<AudioChunk>,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    );
}

/// One-shot compare-and-set latch: the first `claim()` wins.
#[derive(Debug, Default)]
pub struct FinalizeGuard {
    finalized: AtomicBool,
}

impl FinalizeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` for exactly one caller.
    pub fn claim(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

enum Command {
    Start {
        max_duration: Duration,
        reply: oneshot::Sender<VoiceResult<()>>,
    },
    Stop,
}

#[derive(Debug)]
enum SignalKind {
    CaptureElapsed,
    GraceElapsed,
    Recognizer(RecognizerEvent),
}

#[derive(Debug)]
struct Signal {
    session: u64,
    kind: SignalKind,
}

/// Handle to the listening controller. Cheap to clone.
#[derive(Clone)]
pub struct ListeningController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ListenerStatus>,
}

impl ListeningController {
    /// Spawn the controller on the current Tokio runtime. The returned receiver
    /// carries partial and final transcript events.
    pub fn spawn(
        config: ListenConfig,
        source: Arc<dyn AudioSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> (Self, mpsc::UnboundedReceiver<ListenEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ListenerStatus::default());

        let worker = ListenWorker {
            config,
            source,
            recognizer,
            session: None,
            next_session: 0,
            status: ListenerStatus::default(),
            status_tx,
            signal_tx,
            event_tx,
        };
        tokio::spawn(worker.run(cmd_rx, signal_rx));

        (Self { cmd_tx, status_rx }, event_rx)
    }

    /// Begin a session that captures for at most `max_duration`. Returns `Ok`
    /// without doing anything while a session is already active. Recognizer
    /// unavailability and audio start failures are returned as errors and do
    /// not produce a transcript event.
    pub async fn start_listening(&self, max_duration: Duration) -> VoiceResult<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Start { max_duration, reply })
            .map_err(|e| VoiceError::ChannelSend(e.to_string()))?;
        rx.await
            .map_err(|e| VoiceError::ChannelSend(format!("listener worker gone: {}", e)))?
    }

    /// Finish the active session now. No-op when idle.
    pub fn stop_listening(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }

    pub fn status(&self) -> ListenerStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_listening(&self) -> bool {
        self.status_rx.borrow().is_listening()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListenerStatus> {
        self.status_rx.clone()
    }
}

struct Session {
    id: u64,
    guard: Arc<FinalizeGuard>,
    transcript: String,
    capture: CaptureHandle,
    recognition: JoinHandle<()>,
    forward: JoinHandle<()>,
    capture_timer: JoinHandle<()>,
    grace_timer: Option<JoinHandle<()>>,
}

impl Session {
    fn teardown(mut self) {
        self.capture_timer.abort();
        if let Some(grace) = self.grace_timer.take() {
            grace.abort();
        }
        self.recognition.abort();
        self.forward.abort();
        self.capture.stop();
    }
}

struct ListenWorker {
    config: ListenConfig,
    source: Arc<dyn AudioSource>,
    recognizer: Arc<dyn SpeechRecognizer>,
    session: Option<Session>,
    next_session: u64,
    status: ListenerStatus,
    status_tx: watch::Sender<ListenerStatus>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    event_tx: mpsc::UnboundedSender<ListenEvent>,
}

impl ListenWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut signal_rx: mpsc::UnboundedReceiver<Signal>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Start { max_duration, reply }) => {
                        let result = self.start(max_duration).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop) => match self.current_id() {
                        Some(id) => self.finalize(id, "stopped"),
                        None => debug!("stop_listening while idle ignored"),
                    },
                    None => break,
                },
                Some(signal) = signal_rx.recv() => self.on_signal(signal),
            }
        }
        if let Some(id) = self.current_id() {
            self.finalize(id, "controller dropped");
        }
    }

    fn current_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    async fn start(&mut self, max_duration: Duration) -> VoiceResult<()> {
        if self.session.is_some() {
            debug!("start_listening while a session is active ignored");
            return Ok(());
        }
        self.status.transcript.clear();
        self.status.last_error = None;

        if !self.recognizer.is_available() {
            return Err(self.fail(VoiceError::RecognizerUnavailable(
                "speech recognizer is not available right now".to_string(),
            )));
        }

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let capture = match self.source.start(audio_tx).await {
            Ok(capture) => capture,
            Err(e) => return Err(self.fail(e)),
        };

        self.next_session += 1;
        let id = self.next_session;
        let guard = Arc::new(FinalizeGuard::new());

        let (rec_tx, mut rec_rx) = mpsc::unbounded_channel();
        let recognizer = Arc::clone(&self.recognizer);
        let recognition = tokio::spawn(async move {
            recognizer.recognize(audio_rx, rec_tx).await;
        });

        let forward = {
            let signal_tx = self.signal_tx.clone();
            let guard = Arc::clone(&guard);
            tokio::spawn(async move {
                while let Some(event) = rec_rx.recv().await {
                    if guard.is_finalized() {
                        break;
                    }
                    let signal = Signal {
                        session: id,
                        kind: SignalKind::Recognizer(event),
                    };
                    if signal_tx.send(signal).is_err() {
                        break;
                    }
                }
            })
        };

        let capture_timer = self.spawn_timer(id, &guard, max_duration, SignalKind::CaptureElapsed);

        self.session = Some(Session {
            id,
            guard,
            transcript: String::new(),
            capture,
            recognition,
            forward,
            capture_timer,
            grace_timer: None,
        });
        self.status.phase = ListenPhase::Capturing;
        self.publish();
        info!(session = id, max_ms = max_duration.as_millis() as u64, "🎤 Listening");
        Ok(())
    }

    fn fail(&mut self, err: VoiceError) -> VoiceError {
        warn!(error = %err, "could not start listening");
        self.status.last_error = Some(err.to_string());
        self.publish();
        err
    }

    fn spawn_timer(
        &self,
        session: u64,
        guard: &Arc<FinalizeGuard>,
        after: Duration,
        kind: SignalKind,
    ) -> JoinHandle<()> {
        let signal_tx = self.signal_tx.clone();
        let guard = Arc::clone(guard);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if !guard.is_finalized() {
                let _ = signal_tx.send(Signal { session, kind });
            }
        })
    }

    fn on_signal(&mut self, signal: Signal) {
        if self.current_id() != Some(signal.session) {
            debug!(session = signal.session, "late signal for a finished session dropped");
            return;
        }
        let id = signal.session;
        match signal.kind {
            SignalKind::CaptureElapsed => self.close_microphone(id),
            SignalKind::GraceElapsed => self.finalize(id, "grace expired"),
            SignalKind::Recognizer(RecognizerEvent::Partial(text)) => self.record_partial(text),
            SignalKind::Recognizer(RecognizerEvent::Final(text)) => {
                if let Some(session) = self.session.as_mut() {
                    session.transcript = text;
                }
                self.finalize(id, "final result");
            }
            SignalKind::Recognizer(RecognizerEvent::Error(RecognitionError::NoSpeech)) => {
                self.finalize(id, "no speech");
            }
            SignalKind::Recognizer(RecognizerEvent::Error(RecognitionError::Failed(msg))) => {
                warn!(session = id, error = %msg, "recognizer error, finalizing with partial text");
                self.status.last_error = Some(msg);
                self.finalize(id, "recognizer error");
            }
        }
    }

    /// Capture timer fired: release the microphone and give the recognizer a
    /// grace window to deliver its final result.
    fn close_microphone(&mut self, id: u64) {
        let grace = self.config.grace();
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.grace_timer.is_some() {
            return;
        }
        let timer = self.spawn_timer(id, &session.guard, grace, SignalKind::GraceElapsed);
        if let Some(session) = self.session.as_mut() {
            session.capture.stop();
            session.grace_timer = Some(timer);
        }
        self.status.phase = ListenPhase::Finalizing;
        self.publish();
        debug!(session = id, grace_ms = grace.as_millis() as u64, "microphone closed, awaiting final result");
    }

    fn record_partial(&mut self, text: String) {
        if let Some(session) = self.session.as_mut() {
            session.transcript = text.clone();
        }
        self.status.transcript = text.clone();
        self.publish();
        let _ = self.event_tx.send(ListenEvent::Partial(text));
    }

    fn finalize(&mut self, id: u64, cause: &'static str) {
        let claimed = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == id && s.guard.claim());
        if !claimed {
            debug!(session = id, cause, "session already finalized");
            return;
        }
        let Some(session) = self.session.take() else {
            return;
        };
        let transcript = Transcript::from_raw(&session.transcript);
        session.teardown();

        self.status.phase = ListenPhase::Idle;
        if let Transcript::Text(text) = &transcript {
            self.status.transcript = text.clone();
        }
        self.publish();
        info!(session = id, cause, empty = transcript.is_empty(), "✅ Listening finished");
        let _ = self.event_tx.send(ListenEvent::Final(transcript));
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status.clone());
    }
}
