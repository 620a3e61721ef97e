//! Detection review dispatch

use detection_core::{Credential, DetectionConfig, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::prompts::build_detection_prompt;
use crate::{TextGenerator, TokenUsage};

/// Feedback for one detection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    /// Response text with surrounding whitespace trimmed
    pub text: String,
    /// Model that produced it
    pub model: String,
    /// Token accounting, when reported
    pub usage: Option<TokenUsage>,
    /// Why generation stopped
    #[serde(skip)]
    pub finish_reason: Option<String>,
}

impl Feedback {
    /// The model stopped because it hit its output token limit
    pub fn is_truncated(&self) -> bool {
        self.finish_reason.as_deref() == Some("MAX_TOKENS")
    }
}

/// Sends a detection to a [`TextGenerator`] exactly once
#[derive(Debug)]
pub struct Dispatcher<G> {
    generator: G,
}

impl<G: TextGenerator> Dispatcher<G> {
    /// Wrap a generator
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// The wrapped generator
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Build the prompt for `config`, send it, and return the trimmed answer
    ///
    /// Failures come back already classified. There is no retry.
    #[instrument(skip_all, fields(model = %self.generator.model()))]
    pub async fn dispatch(
        &self,
        config: &DetectionConfig,
        credential: &Credential,
    ) -> Result<Feedback> {
        let prompt = build_detection_prompt(config);
        let completion = self.generator.generate(credential, &prompt).await?;

        info!(source = %credential.source(), "Received feedback");
        Ok(Feedback {
            text: completion.text.trim().to_string(),
            model: self.generator.model().to_string(),
            usage: completion.usage,
            finish_reason: completion.finish_reason,
        })
    }
}
