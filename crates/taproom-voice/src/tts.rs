//! Speech synthesis backends used by the speaker queue.
//!
//! - [`RemoteTts`]: OpenAI-compatible `/audio/speech` endpoint returning encoded audio.
//! - [`EspeakVoice`]: on-device voices through the `espeak-ng` binary.

use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Backend that turns text into encoded audio bytes (MP3/WAV).
#[async_trait]
pub trait RemoteSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;
}

/// On-device voices identified by capability strings.
#[async_trait]
pub trait LocalVoice: Send + Sync {
    /// Whether `voice_id` is installed. Queried on every call, never cached.
    async fn has_voice(&self, voice_id: &str) -> bool;

    /// Speak `text` with `voice_id`, resolving when playback finishes. Dropping
    /// the future must silence the voice.
    async fn speak(&self, text: &str, voice_id: &str) -> VoiceResult<()>;
}

/// Remote TTS over an OpenAI-compatible API (OpenAI, OpenRouter, etc.).
#[derive(Debug, Clone)]
pub struct RemoteTts {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    api_key: String,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    pub voice: String,
    /// Response format: mp3, wav, opus...
    pub format: String,
    client: reqwest::Client,
}

impl RemoteTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        format: impl Into<String>,
        timeout: Duration,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            format: format.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteSynthesizer for RemoteTts {
    async fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Tts("nothing to synthesize".to_string()));
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": self.format,
        });
        let res = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| VoiceError::Tts(e.to_string()))?;
        if bytes.is_empty() {
            return Err(VoiceError::Tts("TTS API returned empty audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// Local voices via `espeak-ng`. Voice identifiers are espeak names such as
/// `de`, `de+m3` or an installed mbrola voice like `mb-de2`.
#[derive(Debug, Clone)]
pub struct EspeakVoice {
    binary: String,
    /// Words per minute.
    pub rate: u32,
    /// 0–99, 50 is neutral.
    pub pitch: u32,
}

impl Default for EspeakVoice {
    fn default() -> Self {
        Self {
            binary: "espeak-ng".to_string(),
            rate: 160,
            pitch: 45,
        }
    }
}

impl EspeakVoice {
    pub fn new(binary: impl Into<String>, rate: u32, pitch: u32) -> Self {
        Self {
            binary: binary.into(),
            rate,
            pitch,
        }
    }

    async fn list_voices(&self, filter: Option<&str>) -> Option<String> {
        let mut cmd = Command::new(&self.binary);
        match filter {
            Some(f) => cmd.arg(format!("--voices={}", f)),
            None => cmd.arg("--voices"),
        };
        let output = cmd.kill_on_drop(true).output().await.ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Whether an `espeak-ng --voices` listing mentions `voice_id` as a language,
/// voice name or voice file.
pub(crate) fn listing_contains(listing: &str, voice_id: &str) -> bool {
    // "de+m3" selects variant m3 of voice "de".
    let base = voice_id.split('+').next().unwrap_or(voice_id);
    listing.lines().skip(1).any(|line| {
        line.split_whitespace()
            .any(|token| token == base || token.rsplit('/').next() == Some(base))
    })
}

#[async_trait]
impl LocalVoice for EspeakVoice {
    async fn has_voice(&self, voice_id: &str) -> bool {
        let filter = voice_id.starts_with("mb-").then_some("mb");
        match self.list_voices(filter).await {
            Some(listing) => listing_contains(&listing, voice_id),
            None => {
                debug!(voice = voice_id, "espeak-ng voice listing unavailable");
                false
            }
        }
    }

    async fn speak(&self, text: &str, voice_id: &str) -> VoiceResult<()> {
        let status = Command::new(&self.binary)
            .arg("-v")
            .arg(voice_id)
            .arg("-s")
            .arg(self.rate.to_string())
            .arg("-p")
            .arg(self.pitch.to_string())
            .arg(text)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| VoiceError::LocalVoice(format!("{}: {}", self.binary, e)))?;
        if !status.success() {
            return Err(VoiceError::LocalVoice(format!(
                "{} exited with {} for voice {}",
                self.binary, status, voice_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  de              --/M      German             gmw/de
 5  en-gb           --/M      English_(Great_Britain) gmw/en
 5  de              --/M      mb-de2             mb/mb-de2
";

    #[test]
    fn listing_matches_language_and_file() {
        assert!(listing_contains(LISTING, "de"));
        assert!(listing_contains(LISTING, "de+m3"));
        assert!(listing_contains(LISTING, "mb-de2"));
        assert!(!listing_contains(LISTING, "mb-de6"));
        assert!(!listing_contains(LISTING, "fr"));
    }

    #[test]
    fn remote_endpoint_trims_slash() {
        let tts = RemoteTts::new(
            "https://api.example.com/v1/",
            "key",
            "tts-1",
            "onyx",
            "mp3",
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(tts.endpoint(), "https://api.example.com/v1/audio/speech");
    }

    #[tokio::test]
    async fn missing_binary_reports_no_voices() {
        let voice = EspeakVoice::new("/nonexistent/espeak-ng", 160, 45);
        assert!(!voice.has_voice("de").await);
        assert!(voice.speak("hallo", "de").await.is_err());
    }
}
