//! Idle commentary: Toni talks to the room when nobody has talked to Toni for
//! a while.

use crate::jokes::{pick, JokeBook};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Shortest wait between comments; also the minimum quiet time.
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            min_secs: 45,
            max_secs: 90,
        }
    }
}

/// What the host is busy with when a comment comes due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Activity {
    pub listening: bool,
    pub speaking: bool,
    pub processing: bool,
}

impl Activity {
    pub fn is_busy(&self) -> bool {
        self.listening || self.speaking || self.processing
    }

    /// Enter toggles listening; it is ignored while Toni talks or a reply is
    /// being produced.
    pub fn accepts_gesture(&self) -> bool {
        !self.speaking && !self.processing
    }

    /// A reply that arrives mid-session waits until the microphone is released.
    pub fn holds_reply(&self) -> bool {
        self.listening
    }
}

#[derive(Debug, Clone)]
pub struct IdleCommentary {
    config: IdleConfig,
    jokes: JokeBook,
    last_interaction: Instant,
}

impl IdleCommentary {
    pub fn new(config: IdleConfig) -> Self {
        Self {
            config,
            jokes: JokeBook::new(),
            last_interaction: Instant::now(),
        }
    }

    /// Record guest interaction (or a comment just spoken).
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&mut self, now: Instant) {
        self.last_interaction = now;
    }

    pub fn min_quiet(&self) -> Duration {
        Duration::from_secs(self.config.min_secs)
    }

    /// Random wait in `[min_secs, max_secs]`.
    pub fn next_delay(&self) -> Duration {
        let min = self.config.min_secs;
        let max = self.config.max_secs.max(min);
        Duration::from_secs(rand::rng().random_range(min..=max))
    }

    /// Whether a comment should be spoken at `now`.
    pub fn is_due(&self, now: Instant, activity: Activity) -> bool {
        !activity.is_busy() && now.saturating_duration_since(self.last_interaction) >= self.min_quiet()
    }

    pub fn comment(&self, level: u8) -> String {
        let joke = self.jokes.joke(level);
        let toast = self.jokes.toast();
        let options: [&str; 3] = match level {
            0 => [
                "Hallo? Ist noch jemand da?",
                "So still hier… soll ich nen Witz erzählen?",
                "Drück den Knopf, ich langweil mich!",
            ],
            1..=2 => [joke.as_str(), toast.as_str(), "Na, noch ne Runde?"],
            3 => [joke.as_str(), "PROST! Auf den Pegel!", "Weiter so, Leute!"],
            _ => [joke.as_str(), "DAS ist ne PARTY!", "Noch eine Runde für alle!"],
        };
        pick(&options).to_string()
    }
}
