//! API key resolution and shape validation
//!
//! Sources, highest priority first:
//! 1. the `--api-key` command-line flag
//! 2. the `GEMINI_API_KEY` environment variable
//! 3. a developer-only dotenv file (default `.env`)
//!
//! The dotenv file is read as data. It is never loaded into the process
//! environment.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{DetectionError, Result};

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Developer settings file consulted when no flag or env var is set
pub const DEFAULT_DEV_FILE: &str = ".env";

/// Literal prefix of every Google API key
pub const KEY_PREFIX: &str = "AIza";

/// Total length of a Google API key, prefix included
pub const KEY_LEN: usize = 39;

/// Where the key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `--api-key`
    CommandLine,
    /// `GEMINI_API_KEY`
    Environment,
    /// Developer dotenv file
    DevFile,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::CommandLine => write!(f, "--api-key flag"),
            CredentialSource::Environment => write!(f, "{API_KEY_ENV} environment variable"),
            CredentialSource::DevFile => write!(f, "developer settings file"),
        }
    }
}

/// Reasons a string is not shaped like a Google API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShapeViolation {
    /// Does not begin with [`KEY_PREFIX`]
    WrongPrefix,
    /// Not exactly [`KEY_LEN`] characters
    WrongLength {
        /// Observed length in characters
        actual: usize,
    },
    /// Contains something other than letters, digits, `_` or `-`
    DisallowedCharacters,
}

impl fmt::Display for KeyShapeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyShapeViolation::WrongPrefix => {
                write!(f, "Google API keys start with '{KEY_PREFIX}'")
            }
            KeyShapeViolation::WrongLength { actual } => {
                write!(f, "expected {KEY_LEN} characters, got {actual}")
            }
            KeyShapeViolation::DisallowedCharacters => {
                write!(f, "only letters, digits, '_' and '-' are allowed")
            }
        }
    }
}

/// A shape-checked API key
///
/// The key itself is only reachable through [`ExposeSecret`]; `Debug` prints
/// a redacted placeholder.
#[derive(Debug, Clone)]
pub struct Credential {
    key: SecretString,
    source: CredentialSource,
}

impl Credential {
    /// Validate `raw` and wrap it
    pub fn parse(raw: &str, source: CredentialSource) -> Result<Self> {
        validate_key_shape(raw).map_err(DetectionError::InvalidCredentialFormat)?;
        Ok(Self {
            key: SecretString::from(raw.to_string()),
            source,
        })
    }

    /// Where the key was found
    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl ExposeSecret<str> for Credential {
    fn expose_secret(&self) -> &str {
        self.key.expose_secret()
    }
}

/// Syntactic check only; the remote service is not contacted
pub fn validate_key_shape(key: &str) -> std::result::Result<(), KeyShapeViolation> {
    if !key.starts_with(KEY_PREFIX) {
        return Err(KeyShapeViolation::WrongPrefix);
    }
    let actual = key.chars().count();
    if actual != KEY_LEN {
        return Err(KeyShapeViolation::WrongLength { actual });
    }
    if !key[KEY_PREFIX.len()..]
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(KeyShapeViolation::DisallowedCharacters);
    }
    Ok(())
}

/// Pick the highest-priority key that is set and validate it
///
/// Blank values count as unset. Lower-priority sources are not read once a
/// higher one has produced a value, so a bad flag is reported even when the
/// environment holds a good key.
pub fn resolve(
    cli_flag: Option<&str>,
    env_value: Option<&str>,
    dev_file: Option<&Path>,
) -> Result<Credential> {
    let (raw, source) = if let Some(v) = non_blank(cli_flag) {
        (v.to_string(), CredentialSource::CommandLine)
    } else if let Some(v) = non_blank(env_value) {
        (v.to_string(), CredentialSource::Environment)
    } else if let Some(v) = dev_file.and_then(read_dev_file) {
        (v, CredentialSource::DevFile)
    } else {
        return Err(DetectionError::MissingCredential);
    };

    let credential = Credential::parse(&raw, source)?;
    info!(source = %credential.source(), "Resolved API key");
    Ok(credential)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// First non-blank `GEMINI_API_KEY` assignment in a dotenv file
fn read_dev_file(path: &Path) -> Option<String> {
    if !path.is_file() {
        debug!(path = %path.display(), "No developer settings file");
        return None;
    }

    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(_) => {
            warn!(path = %path.display(), "Developer settings file could not be opened");
            return None;
        }
    };

    for entry in entries {
        match entry {
            Ok((name, value)) if name == API_KEY_ENV => {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
            Ok(_) => {}
            Err(_) => {
                // parse errors can quote the offending line, so only the path is logged
                warn!(path = %path.display(), "Developer settings file is malformed, ignoring it");
                return None;
            }
        }
    }
    None
}
