//! Ambient energy monitor: frames microphone audio into RMS readings at roughly
//! 6 Hz for the party-level engine.
//!
//! The monitor shares the microphone with the listening controller, so the host
//! must `pause()` it before capture starts and `resume()` it afterwards.

use crate::audio::{AudioChunk, AudioSource, CaptureHandle};
use crate::error::VoiceResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Energy monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub sample_rate: u32,
    /// Samples per RMS frame (default 2667, ~6 readings/s at 16 kHz).
    pub frame_size: usize,
    /// RMS below this counts as silence (default 0.015).
    pub silence_threshold: f32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 2667,
            silence_threshold: 0.015,
        }
    }
}

/// One RMS reading plus how long the room has been quiet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReading {
    pub energy: f32,
    pub silence: Duration,
}

/// Root-mean-square of a frame. Empty frames are silent.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Accumulates time spent below the silence threshold.
#[derive(Debug, Clone)]
pub struct SilenceTracker {
    threshold: f32,
    silence: Duration,
    last_update: Option<Instant>,
}

impl SilenceTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            silence: Duration::ZERO,
            last_update: None,
        }
    }

    /// Record a reading taken at `now` and return the current silence duration.
    pub fn observe(&mut self, energy: f32, now: Instant) -> Duration {
        let delta = self
            .last_update
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        if energy < self.threshold {
            self.silence += delta;
        } else {
            self.silence = Duration::ZERO;
        }
        self.last_update = Some(now);
        self.silence
    }

    pub fn silence(&self) -> Duration {
        self.silence
    }
}

/// Streams RMS energy readings from an [`AudioSource`].
pub struct EnergyMonitor {
    source: Arc<dyn AudioSource>,
    config: EnergyConfig,
    reading_tx: mpsc::UnboundedSender<EnergyReading>,
    running: Option<(CaptureHandle, JoinHandle<()>)>,
}

impl EnergyMonitor {
    /// Create a stopped monitor and the receiver its readings arrive on.
    pub fn new(
        source: Arc<dyn AudioSource>,
        config: EnergyConfig,
    ) -> (Self, mpsc::UnboundedReceiver<EnergyReading>) {
        let (reading_tx, reading_rx) = mpsc::unbounded_channel();
        (
            Self {
                source,
                config,
                reading_tx,
                running: None,
            },
            reading_rx,
        )
    }

    /// Open the microphone and start emitting readings. No-op while running.
    pub async fn resume(&mut self) -> VoiceResult<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        let capture = self.source.start(chunk_tx).await?;
        let task = tokio::spawn(frame_loop(
            chunk_rx,
            self.config.clone(),
            self.reading_tx.clone(),
        ));
        self.running = Some((capture, task));
        info!("🎚️ Energy monitor running");
        Ok(())
    }

    /// Release the microphone. No-op while paused.
    pub fn pause(&mut self) {
        if let Some((mut capture, task)) = self.running.take() {
            capture.stop();
            task.abort();
            info!("🎚️ Energy monitor paused");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for EnergyMonitor {
    fn drop(&mut self) {
        self.pause();
    }
}

async fn frame_loop(
    mut chunk_rx: mpsc::UnboundedReceiver<AudioChunk>,
    config: EnergyConfig,
    reading_tx: mpsc::UnboundedSender<EnergyReading>,
) {
    let frame_size = config.frame_size.max(1);
    let mut frame: Vec<f32> = Vec::with_capacity(frame_size);
    let mut silence = SilenceTracker::new(config.silence_threshold);

    while let Some(chunk) = chunk_rx.recv().await {
        for sample in chunk.samples {
            frame.push(sample);
            if frame.len() == frame_size {
                let energy = rms(&frame);
                frame.clear();
                let reading = EnergyReading {
                    energy,
                    silence: silence.observe(energy, chunk.timestamp),
                };
                if reading_tx.send(reading).is_err() {
                    debug!("energy reading receiver dropped");
                    return;
                }
            }
        }
    }
}
