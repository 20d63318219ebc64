//! Audio capture and playback using CPAL and Rodio
//!
//! cpal input streams and rodio output streams are `!Send` on some platforms, so
//! each device lives on a dedicated OS thread and is controlled from async code
//! through a `Send` handle.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use rodio::{OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// How often playback completion is polled.
const PLAYBACK_POLL: Duration = Duration::from_millis(50);

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Buffer size in samples (default: 480 for 30ms at 16kHz)
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            buffer_size: 480, // 30ms at 16kHz
        }
    }
}

/// Audio chunk sent from the capture thread
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Audio samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,

    /// Timestamp when captured
    pub timestamp: std::time::Instant,
}

/// Handle for a running capture. Stopping (or dropping) it releases the
/// microphone; the chunk sender passed to [`AudioSource::start`] is dropped with
/// it, which downstream consumers observe as end-of-audio.
pub struct CaptureHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl CaptureHandle {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    /// Release the input device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }

    pub fn is_active(&self) -> bool {
        self.stop.is_some()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Something that can open the microphone and stream chunks.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Begin capture, resolving once the device is open. Chunks are sent on
    /// `chunk_tx` until the returned handle is stopped.
    async fn start(&self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<CaptureHandle>;
}

/// Something that can play encoded audio (WAV/MP3) to the output device.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `bytes` and resolve once playback has finished.
    async fn play(&self, bytes: Vec<u8>) -> VoiceResult<()>;

    /// Silence the device immediately.
    fn halt(&self);
}

/// Audio capture system using CPAL
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
    stream_config: StreamConfig,
}

impl AudioCapture {
    /// Create a new audio capture system
    pub fn new(config: AudioConfig) -> VoiceResult<Self> {
        info!(
            "🎤 Initializing audio capture ({}Hz, {} channels)",
            config.sample_rate, config.channels
        );

        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string()))?;

        info!(
            "📱 Using input device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        // Fails early when the device cannot report any input config.
        device.default_input_config()?;

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self {
            config,
            device,
            stream_config,
        })
    }

    /// Start capturing audio and send fixed-size chunks to the provided channel
    pub fn start_capture(self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<Stream> {
        let buffer_size = self.config.buffer_size.max(1);
        let mut sample_buffer = Vec::with_capacity(buffer_size);

        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    sample_buffer.push(sample);
                    if sample_buffer.len() >= buffer_size {
                        let chunk = AudioChunk {
                            samples: std::mem::replace(
                                &mut sample_buffer,
                                Vec::with_capacity(buffer_size),
                            ),
                            timestamp: std::time::Instant::now(),
                        };
                        // Receiver gone means the consumer stopped listening.
                        let _ = chunk_tx.send(chunk);
                    }
                }
            },
            move |err| {
                warn!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        info!("✅ Audio capture started");
        Ok(stream)
    }

    /// List available input devices
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

/// Default microphone via CPAL. Each `start` opens a fresh stream on its own thread.
#[derive(Debug, Clone, Default)]
pub struct CpalSource {
    config: AudioConfig,
}

impl CpalSource {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AudioSource for CpalSource {
    async fn start(&self, chunk_tx: mpsc::UnboundedSender<AudioChunk>) -> VoiceResult<CaptureHandle> {
        let config = self.config.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<VoiceResult<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("taproom-capture".to_string())
            .spawn(move || {
                let stream = match AudioCapture::new(config).and_then(|c| c.start_capture(chunk_tx)) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Returns on stop or when the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                info!("⏹️ Audio capture released");
            })?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(CaptureHandle::new(move || {
                let _ = stop_tx.send(());
            })),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(VoiceError::AudioDevice(
                "capture thread exited before reporting".to_string(),
            )),
        }
    }
}

/// Playback through the default output device using Rodio.
pub struct RodioSink {
    sink: Arc<Sink>,
    // Dropping this ends the thread that owns the OutputStream.
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioSink {
    /// Open the default output device.
    pub fn new() -> VoiceResult<Self> {
        info!("🔊 Initializing audio playback");
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<Arc<Sink>>>();
        let (keep_tx, keep_rx) = std_mpsc::channel::<()>();

        thread::Builder::new()
            .name("taproom-playback".to_string())
            .spawn(move || {
                let (stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => Arc::new(sink),
                    Err(e) => {
                        let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                        return;
                    }
                };
                if ready_tx.send(Ok(sink)).is_err() {
                    return;
                }
                let _ = keep_rx.recv();
                drop(stream);
            })?;

        let sink = ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("playback thread exited".to_string()))??;
        info!("✅ Audio playback initialized");
        Ok(Self {
            sink,
            _keepalive: keep_tx,
        })
    }

}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, bytes: Vec<u8>) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Err(VoiceError::Playback("empty audio payload".to_string()));
        }
        let source = rodio::Decoder::new(Cursor::new(bytes))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        self.sink.play();
        while !self.sink.empty() {
            tokio::time::sleep(PLAYBACK_POLL).await;
        }
        Ok(())
    }

    fn halt(&self) {
        self.sink.stop();
        info!("⏹️ Audio playback stopped");
    }
}
