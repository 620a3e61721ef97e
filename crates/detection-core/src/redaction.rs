//! Secret scrubbing for log lines and rendered errors
//!
//! Remote error bodies are passed through [`RedactionEngine::redact`] before
//! they reach a debug log, and the CLI runs every rendered error through
//! [`scrub_secret`] with the resolved key as a last guard.

use regex::Regex;
use std::fmt;
use tracing::debug;

/// Kinds of secret the engine recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretType {
    /// Google API key (AIza...)
    GoogleApiKey,
    /// `Authorization: Bearer ...` style token
    BearerToken,
    /// `key=...` query parameter
    KeyParameter,
    /// `api_key = "..."`, `secret: ...` and similar assignments
    GenericSecret,
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretType::GoogleApiKey => write!(f, "GOOGLE_API_KEY"),
            SecretType::BearerToken => write!(f, "BEARER_TOKEN"),
            SecretType::KeyParameter => write!(f, "KEY_PARAM"),
            SecretType::GenericSecret => write!(f, "SECRET"),
        }
    }
}

/// Pattern-based redaction
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    patterns: Vec<(SecretType, Regex)>,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RedactionEngine {
    /// Create an engine with the default patterns
    pub fn new() -> Self {
        let mut patterns = Vec::new();

        if let Ok(re) = Regex::new(r"AIza[0-9A-Za-z_-]{35}") {
            patterns.push((SecretType::GoogleApiKey, re));
        }

        if let Ok(re) = Regex::new(r"(?i)bearer\s+[a-zA-Z0-9_\-\.=]{20,}") {
            patterns.push((SecretType::BearerToken, re));
        }

        if let Ok(re) = Regex::new(r"([?&])key=[^&\s]+") {
            patterns.push((SecretType::KeyParameter, re));
        }

        if let Ok(re) =
            Regex::new("(?i)(secret|api[_-]?key|token)[\"']?\\s*[:=]\\s*[\"']?[a-zA-Z0-9_-]{16,}[\"']?")
        {
            patterns.push((SecretType::GenericSecret, re));
        }

        Self { patterns }
    }

    /// Replace every recognised secret with a `REDACTED_<TYPE>` marker
    pub fn redact(&self, content: &str) -> String {
        let mut result = content.to_string();

        for (secret_type, pattern) in &self.patterns {
            let marker = format!("REDACTED_{secret_type}");
            let replacement = match secret_type {
                SecretType::KeyParameter => format!("${{1}}key={marker}"),
                _ => marker,
            };
            let replaced = pattern.replace_all(&result, replacement.as_str());
            if replaced != result {
                debug!(kind = %secret_type, "Redacted secret");
                result = replaced.into_owned();
            }
        }

        result
    }
}

/// Remove every occurrence of `secret` from `text`
pub fn scrub_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "[REDACTED]")
}
