//! Offline keyword responder. Always answers, never fails.

use crate::jokes::{pick, JokeBook};

/// Party level from which every joke is a dirty one.
pub const DIRTY_LEVEL: u8 = 4;

const JOKE_WORDS: &[&str] = &["witz", "spruch", "erzähl"];
const DIRTY_WORDS: &[&str] = &["dreck", "versaut", "unanständig"];

const DIRTY_JOKES: &[&str] = &[
    "Ich kenne einen dreckigen Witz… aber den erzähl ich nur, wenn du mir noch ein Bier versprichst.",
    "Der Witz ist so schmutzig, den muss ich erst durch die Spülmaschine jagen.",
    "Versaut? Um die Uhrzeit? Erst die nächste Runde, dann reden wir.",
];

pub const HELP_REPLY: &str = "Sag zum Beispiel: Toni, erzähl einen Witz.";
pub const DEFAULT_REPLY: &str = "Ich hab dich gehört. Sag: Toni, erzähl einen Witz.";

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

#[derive(Debug, Clone, Default)]
pub struct Brain {
    jokes: JokeBook,
}

impl Brain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, party_level: u8) -> String {
        let text = command.to_lowercase();

        if mentions(&text, JOKE_WORDS) {
            if mentions(&text, DIRTY_WORDS) || party_level >= DIRTY_LEVEL {
                return pick(DIRTY_JOKES).to_string();
            }
            return self.jokes.joke(party_level);
        }
        if text.contains("prost") {
            return self.jokes.toast();
        }
        if text.contains("hilfe") {
            return HELP_REPLY.to_string();
        }
        DEFAULT_REPLY.to_string()
    }
}
