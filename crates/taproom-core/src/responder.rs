//! Picks the reply to a guest: remote banter when configured, the keyword brain
//! otherwise or when banter fails.

use crate::brain::Brain;
use crate::error::PersonaResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Remote text generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, command: &str, party_level: u8) -> PersonaResult<String>;
}

#[derive(Clone, Default)]
pub struct Responder {
    generator: Option<Arc<dyn Generator>>,
    brain: Brain,
}

impl Responder {
    pub fn new(generator: Option<Arc<dyn Generator>>) -> Self {
        Self {
            generator,
            brain: Brain::new(),
        }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn respond(&self, command: &str, party_level: u8) -> String {
        if let Some(generator) = &self.generator {
            match generator.generate(command, party_level).await {
                Ok(reply) => return reply,
                Err(e) => warn!(error = %e, "banter failed, falling back to keyword brain"),
            }
        }
        self.brain.respond(command, party_level)
    }
}
