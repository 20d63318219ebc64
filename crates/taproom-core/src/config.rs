//! Taproom configuration.
//!
//! Precedence: built-in defaults < TOML file (`TAPROOM_CONFIG`, default
//! `config/taproom`) < `TAPROOM__*` environment variables. Credentials fall back
//! to the conventional `TTS_API_KEY`, `STT_API_KEY` and `LLM_API_KEY` /
//! `OPENROUTER_API_KEY` variables.

use crate::banter::BanterConfig;
use crate::error::PersonaResult;
use crate::idle::IdleConfig;
use serde::{Deserialize, Serialize};
use taproom_voice::{EnergyConfig, ListenConfig, PartyConfig, RecognizerConfig, SpeakerConfig};

const DEFAULT_CONFIG_PATH: &str = "config/taproom";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaproomConfig {
    pub party: PartyConfig,
    pub listen: ListenConfig,
    pub recognizer: RecognizerConfig,
    pub speaker: SpeakerConfig,
    pub energy: EnergyConfig,
    pub banter: BanterConfig,
    pub idle: IdleConfig,
    /// Enables remote synthesis.
    pub tts_api_key: Option<String>,
    /// Enables the remote transcriber.
    pub stt_api_key: Option<String>,
    /// Enables remote banter.
    pub llm_api_key: Option<String>,
}

impl TaproomConfig {
    /// Load from `TAPROOM_CONFIG` (or `config/taproom.toml`) and the environment.
    pub fn load() -> PersonaResult<Self> {
        let path = std::env::var("TAPROOM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(&path)?;
        config.fill_credentials(|key| std::env::var(key).ok());
        config.party.validate()?;
        Ok(config)
    }

    /// Load from a file path (extension optional, missing file allowed) plus
    /// `TAPROOM__*` environment variables.
    pub fn load_from(path: &str) -> PersonaResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("TAPROOM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(built.try_deserialize()?)
    }

    /// Fill unset credentials from conventional variables; blank values count as unset.
    pub fn fill_credentials(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };
        for (slot, keys) in [
            (&mut self.tts_api_key, &["TTS_API_KEY", "OPENAI_API_KEY"][..]),
            (&mut self.stt_api_key, &["STT_API_KEY", "OPENAI_API_KEY"][..]),
            (&mut self.llm_api_key, &["LLM_API_KEY", "OPENROUTER_API_KEY"][..]),
        ] {
            let current = slot.take().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            *slot = current.or_else(|| first(keys));
        }
    }
}
