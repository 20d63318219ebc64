//! **Party-Level Engine** — turns a stream of ambient energy samples into a
//! slowly-evolving discrete party level (0–5).
//!
//! Raw RMS energy is noisy. The engine averages the last ~10 seconds of samples
//! (60 samples at ~6 Hz), classifies the average against rise/fall thresholds
//! with hysteresis, and only lets the integer level move one step at a time
//! after a minimum dwell time. A separate exponentially smoothed level reacts on
//! every sample and is meant for presentation only.

use crate::error::{VoiceError, VoiceResult};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Highest discrete party level.
pub const MAX_LEVEL: u8 = 5;

/// Hours during which a small energy bonus is applied. The window wraps around
/// midnight when `start_hour > end_hour` (default 23:00–04:00).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LateNightWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    /// Added to the average energy inside the window.
    pub bonus: f64,
}

impl Default for LateNightWindow {
    fn default() -> Self {
        Self {
            start_hour: 23,
            end_hour: 4,
            bonus: 0.01,
        }
    }
}

impl LateNightWindow {
    /// Whether `hour` (0–23, local time) falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour == self.end_hour {
            return false;
        }
        if self.start_hour < self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    fn bonus_at(&self, hour: u32) -> f64 {
        if self.contains(hour) {
            self.bonus
        } else {
            0.0
        }
    }
}

/// Configuration for the party-level engine. Defaults are tuned for ~6 energy
/// samples per second.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartyConfig {
    /// Rolling history size (default 60, ~10s at 6 Hz).
    pub history_capacity: usize,
    /// Samples required before the level is evaluated at all (default 10).
    pub min_samples: usize,
    /// Threshold to climb past index `i` when the current level is `<= i`.
    pub rise_thresholds: [f64; 5],
    /// Threshold to stay above index `i` once the level is already `> i`.
    pub fall_thresholds: [f64; 5],
    /// Exponential smoothing factor for `smoothed_level` (default 0.08).
    pub smoothing_alpha: f64,
    /// Minimum seconds between two discrete level changes (default 20).
    pub dwell_secs: u64,
    pub late_night: LateNightWindow,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            history_capacity: 60,
            min_samples: 10,
            rise_thresholds: [0.008, 0.025, 0.05, 0.08, 0.12],
            fall_thresholds: [0.003, 0.012, 0.03, 0.05, 0.08],
            smoothing_alpha: 0.08,
            dwell_secs: 20,
            late_night: LateNightWindow::default(),
        }
    }
}

impl PartyConfig {
    pub fn dwell_time(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }

    /// Reject threshold tables that would break hysteresis or ordering.
    pub fn validate(&self) -> VoiceResult<()> {
        if self.history_capacity == 0 {
            return Err(VoiceError::Config("history_capacity must be > 0".to_string()));
        }
        if self.min_samples == 0 || self.min_samples > self.history_capacity {
            return Err(VoiceError::Config(format!(
                "min_samples must be in 1..={}, got {}",
                self.history_capacity, self.min_samples
            )));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(VoiceError::Config(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        for i in 0..5 {
            let (rise, fall) = (self.rise_thresholds[i], self.fall_thresholds[i]);
            if fall >= rise {
                return Err(VoiceError::Config(format!(
                    "fall threshold {} must be below rise threshold {} at index {}",
                    fall, rise, i
                )));
            }
            if i > 0
                && (rise <= self.rise_thresholds[i - 1] || fall <= self.fall_thresholds[i - 1])
            {
                return Err(VoiceError::Config(format!(
                    "thresholds must be strictly ascending (index {})",
                    i
                )));
            }
        }
        if self.late_night.start_hour > 23 || self.late_night.end_hour > 23 {
            return Err(VoiceError::Config("late-night hours must be 0-23".to_string()));
        }
        Ok(())
    }
}

/// Published view of the engine state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartySnapshot {
    pub level: u8,
    /// Continuous 0.0–5.0 value for animations.
    pub smoothed_level: f64,
}

/// Persona mood derived from the discrete level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Asleep,
    Cozy,
    WarmingUp,
    Party,
    Escalation,
    Maximum,
}

impl Mood {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Mood::Asleep,
            1 => Mood::Cozy,
            2 => Mood::WarmingUp,
            3 => Mood::Party,
            4 => Mood::Escalation,
            _ => Mood::Maximum,
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Mood::Asleep => "😴",
            Mood::Cozy => "🍺",
            Mood::WarmingUp => "😄",
            Mood::Party => "🎉",
            Mood::Escalation => "🤪",
            Mood::Maximum => "🔥",
        }
    }

    /// Status-line label shown next to the level bar.
    pub fn label(self) -> &'static str {
        match self {
            Mood::Asleep => "SCHLAFMODUS",
            Mood::Cozy => "GEMÜTLICH",
            Mood::WarmingUp => "WIRD WARM",
            Mood::Party => "PARTY!",
            Mood::Escalation => "ESKALATION",
            Mood::Maximum => "MAXIMUM",
        }
    }
}

/// Classifies ambient energy into a party level. Owned by a single task; other
/// tasks observe it through [`PartyEngine::subscribe`].
pub struct PartyEngine {
    config: PartyConfig,
    history: VecDeque<f32>,
    level: u8,
    smoothed_level: f64,
    last_change: Option<Instant>,
    snapshot_tx: watch::Sender<PartySnapshot>,
}

impl PartyEngine {
    pub fn new(config: PartyConfig) -> VoiceResult<Self> {
        config.validate()?;
        let (snapshot_tx, _) = watch::channel(PartySnapshot::default());
        Ok(Self {
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            level: 0,
            smoothed_level: 0.0,
            last_change: None,
            snapshot_tx,
        })
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PartySnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Feed one energy sample using the wall clock and local hour.
    pub fn update(&mut self, energy: f32) {
        let hour = chrono::Local::now().hour();
        self.update_at(energy, Instant::now(), hour);
    }

    /// Feed one energy sample at an explicit instant and local hour.
    pub fn update_at(&mut self, energy: f32, now: Instant, hour: u32) {
        let energy = if energy.is_finite() && energy > 0.0 { energy } else { 0.0 };
        self.history.push_back(energy);
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }

        if self.history.len() < self.config.min_samples {
            return;
        }

        let sum: f64 = self.history.iter().map(|&e| e as f64).sum();
        let avg = sum / self.history.len() as f64;
        let adjusted = avg + self.config.late_night.bonus_at(hour);
        let target = self.target_level(adjusted);

        self.smoothed_level += self.config.smoothing_alpha * (target as f64 - self.smoothed_level);

        let dwell_elapsed = self
            .last_change
            .map_or(true, |at| now.saturating_duration_since(at) >= self.config.dwell_time());

        if dwell_elapsed && target != self.level {
            let previous = self.level;
            let stepped = if target > self.level {
                self.level + 1
            } else {
                self.level - 1
            };
            self.level = stepped.min(MAX_LEVEL);
            self.last_change = Some(now);
            info!(
                from = previous,
                to = self.level,
                target,
                avg_energy = adjusted,
                "party level changed"
            );
        } else if target != self.level {
            debug!(level = self.level, target, "party level held by dwell time");
        }

        self.publish();
    }

    /// Number of thresholds exceeded by `adjusted`, using the fall threshold for
    /// levels already reached.
    pub fn target_level(&self, adjusted: f64) -> u8 {
        let mut target = 0u8;
        for i in 0..MAX_LEVEL {
            let idx = i as usize;
            let threshold = if i < self.level {
                self.config.fall_thresholds[idx]
            } else {
                self.config.rise_thresholds[idx]
            };
            if adjusted > threshold {
                target = i + 1;
            }
        }
        target.min(MAX_LEVEL)
    }

    /// Clear history and return to level 0.
    pub fn reset(&mut self) {
        self.history.clear();
        self.level = 0;
        self.smoothed_level = 0.0;
        self.last_change = None;
        self.publish();
        info!("party engine reset");
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn smoothed_level(&self) -> f64 {
        self.smoothed_level
    }

    pub fn mood(&self) -> Mood {
        Mood::from_level(self.level)
    }

    pub fn snapshot(&self) -> PartySnapshot {
        PartySnapshot {
            level: self.level,
            smoothed_level: self.smoothed_level,
        }
    }

    /// Samples currently held in the rolling history.
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &PartyConfig {
        &self.config
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
