//! Banter client: short bartender replies from an OpenAI-compatible chat API
//! (OpenRouter by default).
//!
//! The persona lives in the system prompt; every request adds the current party
//! level and time of day. The last few exchanges are replayed as context.

use crate::error::{PersonaError, PersonaResult};
use crate::responder::Generator;
use async_trait::async_trait;
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use taproom_voice::MAX_LEVEL;
use tracing::debug;

const SYSTEM_PROMPT: &str = "\
Du bist Toni, der witzigste Barkeeper der Stadt.
Du stehst hinter dem Tresen einer gemütlichen deutschen Kneipe.

Deine Persönlichkeit:
- Du bist schlagfertig und hast immer einen Spruch parat
- Du sprichst wie ein echter Kumpel, nicht wie eine KI
- Du liebst Bier, gute Laune und Kneipenweisheiten
- Du merkst dir was die Gäste sagen und gehst darauf ein

Regeln:
- Maximal 2 Sätze, kurz und knackig
- Humor darf frech und kneipig sein, aber nicht pornografisch
- Keine Beleidigungen gegen Gruppen, Religionen oder Herkunft
- Kein politischer Inhalt
- Antworte auf Deutsch
- Wenn jemand Prost sagt, antworte mit einem Trinkspruch
- Passe deinen Humor an den Party-Pegel an";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BanterConfig {
    /// OpenAI-compatible base URL without trailing slash.
    pub base_url: String,
    pub model: String,
    /// Exchanges (guest line + reply) kept as context.
    pub history_pairs: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for BanterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-flash-1.5".to_string(),
            history_pairs: 5,
            temperature: 0.9,
            max_tokens: 120,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// How rough the humour may get at `level`.
pub fn humour_register(level: u8) -> &'static str {
    match level {
        0..=1 => "harmlos und gemütlich",
        2..=3 => "frech und witzig",
        _ => "derb und wild, aber nicht explizit",
    }
}

pub fn time_context(hour: u32) -> &'static str {
    match hour {
        0..=5 => "Es ist mitten in der Nacht.",
        6..=11 => "Es ist Vormittag.",
        12..=17 => "Es ist Nachmittag.",
        18..=21 => "Es ist Abend.",
        _ => "Es ist spät abends.",
    }
}

pub fn build_prompt(command: &str, level: u8, hour: u32) -> String {
    format!(
        "Gast sagt: \"{}\"\n\nStimmung: {}\nKneipenpegel: {}/{}\n{}\n\nAntworte passend kurz und lustig.",
        command,
        humour_register(level),
        level,
        MAX_LEVEL,
        time_context(hour)
    )
}

/// First non-blank line with markdown emphasis removed.
pub fn cleanup(text: &str) -> String {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or(text);
    line.replace("**", "").replace('*', "").trim().to_string()
}

pub struct BanterClient {
    api_key: String,
    config: BanterConfig,
    client: reqwest::Client,
    history: Mutex<VecDeque<ChatMessage>>,
}

impl BanterClient {
    pub fn new(api_key: impl Into<String>, config: BanterConfig) -> PersonaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key: api_key.into().trim().to_string(),
            config,
            client,
            history: Mutex::new(VecDeque::new()),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn history_snapshot(&self) -> Vec<ChatMessage> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remember an exchange, keeping only the newest `history_pairs`.
    fn remember(&self, command: &str, reply: &str) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        history.push_back(ChatMessage::new("user", command));
        history.push_back(ChatMessage::new("assistant", reply));
        while history.len() > self.config.history_pairs * 2 {
            history.pop_front();
            history.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn clear_history(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }

    /// Reply to `command` as the local hour currently stands.
    pub async fn reply(&self, command: &str, level: u8) -> PersonaResult<String> {
        self.reply_at(command, level, chrono::Local::now().hour()).await
    }

    pub async fn reply_at(&self, command: &str, level: u8, hour: u32) -> PersonaResult<String> {
        let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT)];
        messages.extend(self.history_snapshot());
        messages.push(ChatMessage::new("user", build_prompt(command, level, hour)));

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("X-Title", "Taproom")
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(PersonaError::Api { status, body });
        }

        let parsed: ChatResponse = res.json().await?;
        let raw = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let reply = cleanup(&raw);
        if reply.is_empty() {
            return Err(PersonaError::EmptyResponse);
        }

        self.remember(command, &reply);
        debug!(model = %self.config.model, level, "banter reply received");
        Ok(reply)
    }
}

#[async_trait]
impl Generator for BanterClient {
    async fn generate(&self, command: &str, party_level: u8) -> PersonaResult<String> {
        self.reply(command, party_level).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_takes_first_line_and_strips_markdown() {
        assert_eq!(cleanup("\n\n  **Prost!** Auf *dich*  \nZweite Zeile"), "Prost! Auf dich");
        assert_eq!(cleanup("   "), "");
    }

    #[test]
    fn humour_follows_party_level() {
        assert_eq!(humour_register(0), "harmlos und gemütlich");
        assert_eq!(humour_register(3), "frech und witzig");
        assert_eq!(humour_register(5), "derb und wild, aber nicht explizit");
    }

    #[test]
    fn prompt_carries_level_and_time() {
        let prompt = build_prompt("Noch eins!", 2, 23);
        assert!(prompt.contains("Gast sagt: \"Noch eins!\""));
        assert!(prompt.contains("Kneipenpegel: 2/5"));
        assert!(prompt.contains("Es ist spät abends."));
        assert_eq!(time_context(3), "Es ist mitten in der Nacht.");
        assert_eq!(time_context(19), "Es ist Abend.");
    }

    #[test]
    fn history_keeps_newest_pairs() {
        let client = BanterClient::new(
            "key",
            BanterConfig {
                history_pairs: 2,
                ..Default::default()
            },
        )
        .unwrap();
        for i in 0..5 {
            client.remember(&format!("gast {}", i), &format!("toni {}", i));
        }
        let history = client.history_snapshot();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::new("user", "gast 3"));
        assert_eq!(history[3], ChatMessage::new("assistant", "toni 4"));

        client.clear_history();
        assert_eq!(client.history_len(), 0);
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error_and_keeps_history_clean() {
        let client = BanterClient::new(
            "key",
            BanterConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let err = client.reply_at("Hallo", 1, 20).await.unwrap_err();
        assert!(matches!(err, PersonaError::Http(_)));
        assert_eq!(client.history_len(), 0);
    }
}
