//! **Speaker Queue** — serializes utterances into speech, one at a time, in
//! submission order.
//!
//! Each utterance walks a fallback chain: remote synthesis (only when a
//! credential is configured) → the first installed enhanced local voice → the
//! basic local voice. Backend failures never reach the caller.
//!
//! The queue is an actor: [`SpeakerQueue`] handles send commands to a single
//! worker task that owns the FIFO. Playback of the in-flight utterance runs in
//! its own task so `stop()` can abort it at any point; completions carry a
//! generation number and stale ones are discarded.

use crate::audio::AudioSink;
use crate::error::VoiceResult;
use crate::tts::{LocalVoice, RemoteSynthesizer};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which backend is (or was last) producing speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpeechBackend {
    Remote,
    EnhancedLocal,
    #[default]
    BasicLocal,
}

impl SpeechBackend {
    pub fn label(self) -> &'static str {
        match self {
            SpeechBackend::Remote => "Remote",
            SpeechBackend::EnhancedLocal => "Enhanced",
            SpeechBackend::BasicLocal => "Basic",
        }
    }
}

/// Observable speaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpeakerState {
    pub is_speaking: bool,
    pub active_backend: SpeechBackend,
    /// Utterances waiting behind the one in flight.
    pub queued: usize,
}

/// Speaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// OpenAI-compatible base URL for remote synthesis.
    pub remote_base_url: String,
    pub remote_model: String,
    pub remote_voice: String,
    pub remote_format: String,
    pub remote_timeout_secs: u64,
    /// Higher-quality local voices, best first.
    pub enhanced_voices: Vec<String>,
    /// Always-available fallback voice.
    pub basic_voice: String,
    pub espeak_binary: String,
    pub local_rate: u32,
    pub local_pitch: u32,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "https://api.openai.com/v1".to_string(),
            remote_model: "tts-1".to_string(),
            remote_voice: "onyx".to_string(),
            remote_format: "mp3".to_string(),
            remote_timeout_secs: 10,
            enhanced_voices: vec![
                "mb-de6".to_string(),
                "mb-de4".to_string(),
                "mb-de2".to_string(),
            ],
            basic_voice: "de".to_string(),
            espeak_binary: "espeak-ng".to_string(),
            local_rate: 160,
            local_pitch: 45,
        }
    }
}

impl SpeakerConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// The backends available to the queue. `remote` is only set when a credential
/// is configured; it needs `sink` to be audible.
#[derive(Clone)]
pub struct SpeakerBackends {
    pub remote: Option<Arc<dyn RemoteSynthesizer>>,
    pub sink: Option<Arc<dyn AudioSink>>,
    pub local: Arc<dyn LocalVoice>,
}

enum SpeakerCommand {
    Speak(String),
    Stop,
    WhenIdle(oneshot::Sender<()>),
}

enum PlaybackEvent {
    Started { generation: u64, backend: SpeechBackend },
    Finished { generation: u64 },
}

/// Handle to the speaker queue. Cheap to clone; the worker exits when the last
/// handle is dropped.
#[derive(Clone)]
pub struct SpeakerQueue {
    cmd_tx: mpsc::UnboundedSender<SpeakerCommand>,
    state_rx: watch::Receiver<SpeakerState>,
}

impl SpeakerQueue {
    /// Spawn the worker on the current Tokio runtime.
    pub fn spawn(config: SpeakerConfig, backends: SpeakerBackends) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SpeakerState::default());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = SpeakerWorker {
            chain: Arc::new(BackendChain { config, backends }),
            queue: VecDeque::new(),
            in_flight: None,
            generation: 0,
            state: SpeakerState::default(),
            state_tx,
            event_tx,
            idle_waiters: Vec::new(),
        };
        tokio::spawn(worker.run(cmd_rx, event_rx));

        Self { cmd_tx, state_rx }
    }

    /// Queue `text` for speaking. Blank text is ignored.
    pub fn speak(&self, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        if self.cmd_tx.send(SpeakerCommand::Speak(text)).is_err() {
            warn!("speaker worker is gone; utterance dropped");
        }
    }

    /// Clear the queue and silence the current utterance.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(SpeakerCommand::Stop);
    }

    pub fn state(&self) -> SpeakerState {
        *self.state_rx.borrow()
    }

    pub fn is_speaking(&self) -> bool {
        self.state_rx.borrow().is_speaking
    }

    pub fn subscribe(&self) -> watch::Receiver<SpeakerState> {
        self.state_rx.clone()
    }

    /// Resolve once everything queued before this call has played (or been stopped).
    pub async fn wait_idle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(SpeakerCommand::WhenIdle(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct InFlight {
    generation: u64,
    task: JoinHandle<()>,
}

struct SpeakerWorker {
    chain: Arc<BackendChain>,
    queue: VecDeque<String>,
    in_flight: Option<InFlight>,
    generation: u64,
    state: SpeakerState,
    state_tx: watch::Sender<SpeakerState>,
    event_tx: mpsc::UnboundedSender<PlaybackEvent>,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl SpeakerWorker {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<SpeakerCommand>,
        mut event_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SpeakerCommand::Speak(text)) => {
                        self.queue.push_back(text);
                        self.pump();
                    }
                    Some(SpeakerCommand::Stop) => self.stop(),
                    Some(SpeakerCommand::WhenIdle(tx)) => {
                        if self.is_idle() {
                            let _ = tx.send(());
                        } else {
                            self.idle_waiters.push(tx);
                        }
                    }
                    None => break,
                },
                Some(event) = event_rx.recv() => self.on_playback(event),
            }
        }
        self.stop();
        debug!("speaker worker exited");
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Start the next utterance unless one is already in flight.
    fn pump(&mut self) {
        if self.in_flight.is_some() {
            self.state.queued = self.queue.len();
            self.publish();
            return;
        }
        let Some(text) = self.queue.pop_front() else {
            self.state.is_speaking = false;
            self.state.queued = 0;
            self.publish();
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        let chain = Arc::clone(&self.chain);
        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            chain.play(&text, generation, &event_tx).await;
            let _ = event_tx.send(PlaybackEvent::Finished { generation });
        });
        self.in_flight = Some(InFlight { generation, task });
        self.state.is_speaking = true;
        self.state.queued = self.queue.len();
        self.publish();
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        let current = self.in_flight.as_ref().map(|f| f.generation);
        match event {
            PlaybackEvent::Started { generation, backend } if Some(generation) == current => {
                self.state.active_backend = backend;
                self.publish();
            }
            PlaybackEvent::Finished { generation } if Some(generation) == current => {
                self.in_flight = None;
                self.pump();
            }
            _ => debug!("discarding playback event from a stopped utterance"),
        }
    }

    fn stop(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
            if let Some(sink) = &self.chain.backends.sink {
                sink.halt();
            }
            info!(dropped, "🔇 Speaker stopped mid-utterance");
        }
        self.pump();
    }

    fn publish(&self) {
        let state = self.state;
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

struct BackendChain {
    config: SpeakerConfig,
    backends: SpeakerBackends,
}

impl BackendChain {
    /// Speak `text` on the first backend that works. Always returns after the
    /// basic voice has had its turn.
    async fn play(&self, text: &str, generation: u64, events: &mpsc::UnboundedSender<PlaybackEvent>) {
        let started = |backend| {
            let _ = events.send(PlaybackEvent::Started { generation, backend });
        };

        if let (Some(remote), Some(sink)) = (&self.backends.remote, &self.backends.sink) {
            match self.play_remote(remote.as_ref(), sink.as_ref(), text, || started(SpeechBackend::Remote)).await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "remote synthesis failed, falling back to local voice"),
            }
        }

        for voice in &self.config.enhanced_voices {
            if !self.backends.local.has_voice(voice).await {
                continue;
            }
            started(SpeechBackend::EnhancedLocal);
            match self.backends.local.speak(text, voice).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(voice = %voice, error = %e, "enhanced voice failed, falling back");
                    break;
                }
            }
        }

        started(SpeechBackend::BasicLocal);
        if let Err(e) = self.backends.local.speak(text, &self.config.basic_voice).await {
            warn!(voice = %self.config.basic_voice, error = %e, "basic voice failed");
        }
    }

    async fn play_remote(
        &self,
        remote: &dyn RemoteSynthesizer,
        sink: &dyn AudioSink,
        text: &str,
        on_start: impl FnOnce(),
    ) -> VoiceResult<()> {
        let audio = remote.synthesize(text).await?;
        on_start();
        sink.play(audio).await
    }
}
