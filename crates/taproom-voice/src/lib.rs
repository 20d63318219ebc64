//! # Taproom Voice - Party Level, Listening and Speech
//!
//! The real-time half of the Taproom bar persona: it measures how lively the
//! room is, captures one spoken request at a time, and speaks replies through a
//! chain of synthesis backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Host loop                           │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │   Mic (cpal) │→ │ EnergyMonitor│→ │ PartyEngine  │→ level│
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │         ↓  (monitor paused while listening)                 │
//! │  ┌──────────────┐  ┌──────────────┐                         │
//! │  │  Listening   │→ │  Recognizer  │→ partial … final        │
//! │  │  Controller  │  │ (transcribe) │                         │
//! │  └──────────────┘  └──────────────┘                         │
//! │  ┌──────────────┐   remote → enhanced local → basic local   │
//! │  │ SpeakerQueue │→  (rodio)   (espeak-ng mbrola) (espeak-ng)│
//! │  └──────────────┘                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod energy;
pub mod error;
pub mod listener;
pub mod party;
pub mod recognizer;
pub mod speaker;
pub mod tts;

pub use audio::{AudioCapture, AudioChunk, AudioConfig, AudioSink, AudioSource, CaptureHandle, CpalSource, RodioSink};
pub use energy::{rms, EnergyConfig, EnergyMonitor, EnergyReading, SilenceTracker};
pub use error::{VoiceError, VoiceResult};
pub use listener::{
    FinalizeGuard, ListenConfig, ListenEvent, ListenPhase, ListenerStatus, ListeningController,
    RecognitionError, RecognizerEvent, SpeechRecognizer, Transcript,
};
pub use party::{LateNightWindow, Mood, PartyConfig, PartyEngine, PartySnapshot, MAX_LEVEL};
pub use recognizer::{ChunkedRecognizer, RecognizerConfig, RemoteTranscriber, Transcriber};
pub use speaker::{SpeakerBackends, SpeakerConfig, SpeakerQueue, SpeakerState, SpeechBackend};
pub use tts::{EspeakVoice, LocalVoice, RemoteSynthesizer, RemoteTts};
