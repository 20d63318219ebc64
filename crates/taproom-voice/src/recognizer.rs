//! **Speech recognition** — a streaming [`SpeechRecognizer`] built on batch
//! transcription.
//!
//! [`ChunkedRecognizer`] buffers the session's audio, re-transcribes the buffer
//! periodically to produce partial results, and transcribes it once more after
//! the microphone closes to produce the final result. Any [`Transcriber`] works;
//! [`RemoteTranscriber`] talks to an OpenAI-compatible transcription API.

use crate::audio::AudioChunk;
use crate::energy::rms;
use crate::error::{VoiceError, VoiceResult};
use crate::listener::{RecognitionError, RecognizerEvent, SpeechRecognizer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// 30ms at 16 kHz; speech detection looks at frames of this size.
const SPEECH_FRAME: usize = 480;

/// Recognizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub sample_rate: u32,
    /// How often the growing buffer is re-transcribed for partial results.
    pub partial_interval_ms: u64,
    /// A frame louder than this (RMS) counts as speech.
    pub speech_threshold: f32,
    /// OpenAI-compatible base URL for transcription.
    pub stt_base_url: String,
    pub stt_model: String,
    pub language: Option<String>,
    pub stt_timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            partial_interval_ms: 1500,
            speech_threshold: 0.02,
            stt_base_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            language: Some("de".to_string()),
            stt_timeout_secs: 15,
        }
    }
}

impl RecognizerConfig {
    pub fn partial_interval(&self) -> Duration {
        Duration::from_millis(self.partial_interval_ms)
    }
}

/// Batch speech-to-text over mono f32 PCM.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Return the recognized text, or an empty string if nothing was detected.
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<String>;
}

/// Encode f32 PCM (mono) as 16-bit WAV for API upload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceError::Stt(format!("WAV header: {}", e)))?;
        for &s in samples {
            let sample = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
            writer
                .write_sample(sample)
                .map_err(|e| VoiceError::Stt(format!("WAV write: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceError::Stt(format!("WAV finalize: {}", e)))?;
    }
    Ok(cursor.into_inner())
}

/// Whether any frame of `samples` is louder than `threshold`.
pub fn contains_speech(samples: &[f32], threshold: f32) -> bool {
    samples.chunks(SPEECH_FRAME).any(|frame| rms(frame) >= threshold)
}

/// Production STT backend: OpenAI-compatible transcription API (Whisper, etc.).
#[derive(Debug, Clone)]
pub struct RemoteTranscriber {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    api_key: String,
    /// Model: whisper-1 or gpt-4o-transcribe, etc.
    pub model: String,
    pub language: Option<String>,
    client: reqwest::Client,
}

impl RemoteTranscriber {
    pub fn new(config: &RecognizerConfig, api_key: impl Into<String>) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.stt_timeout_secs))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: config.stt_base_url.clone(),
            api_key: api_key.into(),
            model: config.stt_model.clone(),
            language: config.language.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }
        let wav = encode_wav(samples, sample_rate)?;
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().await.map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

/// Streaming recognizer over a batch [`Transcriber`].
pub struct ChunkedRecognizer {
    transcriber: Option<Arc<dyn Transcriber>>,
    config: RecognizerConfig,
}

impl ChunkedRecognizer {
    /// `None` yields a recognizer that reports itself unavailable.
    pub fn new(transcriber: Option<Arc<dyn Transcriber>>, config: RecognizerConfig) -> Self {
        Self { transcriber, config }
    }
}

#[async_trait]
impl SpeechRecognizer for ChunkedRecognizer {
    fn is_available(&self) -> bool {
        self.transcriber.is_some()
    }

    async fn recognize(
        &self,
        mut audio: mpsc::UnboundedReceiver<AudioChunk>,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) {
        let Some(transcriber) = self.transcriber.as_ref() else {
            let _ = events.send(RecognizerEvent::Error(RecognitionError::Failed(
                "no transcriber configured".to_string(),
            )));
            return;
        };
        let sample_rate = self.config.sample_rate;
        let threshold = self.config.speech_threshold;

        let mut buffer: Vec<f32> = Vec::new();
        let mut transcribed_len = 0usize;
        let mut ticker = tokio::time::interval(self.config.partial_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                chunk = audio.recv() => match chunk {
                    Some(chunk) => buffer.extend_from_slice(&chunk.samples),
                    None => break,
                },
                _ = ticker.tick() => {
                    if buffer.len() == transcribed_len || !contains_speech(&buffer, threshold) {
                        continue;
                    }
                    transcribed_len = buffer.len();
                    match transcriber.transcribe(&buffer, sample_rate).await {
                        Ok(text) if !text.trim().is_empty() => {
                            let _ = events.send(RecognizerEvent::Partial(text));
                        }
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "partial transcription failed"),
                    }
                }
            }
        }

        if !contains_speech(&buffer, threshold) {
            let _ = events.send(RecognizerEvent::Error(RecognitionError::NoSpeech));
            return;
        }
        let event = match transcriber.transcribe(&buffer, sample_rate).await {
            Ok(text) if text.trim().is_empty() => RecognizerEvent::Error(RecognitionError::NoSpeech),
            Ok(text) => RecognizerEvent::Final(text),
            Err(e) => RecognizerEvent::Error(RecognitionError::Failed(e.to_string())),
        };
        let _ = events.send(event);
    }
}
