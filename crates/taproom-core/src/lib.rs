//! taproom-core: the Toni persona (configuration, jokes, keyword brain, banter
//! client, idle commentary) on top of `taproom-voice`.

pub mod banter;
pub mod brain;
pub mod config;
pub mod error;
pub mod idle;
pub mod jokes;
pub mod phrases;
pub mod responder;

pub use banter::{BanterClient, BanterConfig};
pub use brain::Brain;
pub use config::TaproomConfig;
pub use error::{PersonaError, PersonaResult};
pub use idle::{Activity, IdleCommentary, IdleConfig};
pub use jokes::JokeBook;
pub use responder::{Generator, Responder};
