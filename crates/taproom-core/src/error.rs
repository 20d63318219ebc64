use taproom_voice::VoiceError;
use thiserror::Error;

pub type PersonaResult<T> = Result<T, PersonaError>;

#[derive(Error, Debug)]
pub enum PersonaError {
    #[error("Banter request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Banter API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Banter API returned an empty reply")]
    EmptyResponse,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Voice error: {0}")]
    Voice(#[from] VoiceError),
}
