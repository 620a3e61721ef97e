//! Detection document loading
//!
//! The document is parsed into plain YAML values only. Tags are refused
//! outright so nothing in the file can ask for a particular type to be built.

use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::models::{DetectionConfig, FieldIssue, FieldProblem, REQUIRED_FIELDS};
use crate::{DetectionError, Result};

/// Read and validate a detection document from disk
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<DetectionConfig> {
    if path.is_dir() {
        return Err(DetectionError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::InvalidData => DetectionError::Parse {
            path: path.to_path_buf(),
            reason: "file is not valid UTF-8".to_string(),
        },
        _ => DetectionError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let config = parse(&content, path)?;
    info!("Loaded detection '{}'", config.title());
    Ok(config)
}

/// Validate a detection document that is already in memory
///
/// `origin` is only used in error messages.
pub fn parse(content: &str, origin: &Path) -> Result<DetectionConfig> {
    let document: Value = if content.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(content).map_err(|e| DetectionError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?
    };

    reject_tags(&document).map_err(|tag| DetectionError::Parse {
        path: origin.to_path_buf(),
        reason: format!("YAML tags are not allowed (found '{tag}')"),
    })?;

    let empty = Mapping::new();
    let mapping = match &document {
        Value::Mapping(m) => m,
        Value::Null => &empty,
        _ => {
            return Err(DetectionError::Parse {
                path: origin.to_path_buf(),
                reason: "document root must be a mapping of keys to values".to_string(),
            })
        }
    };

    for key in mapping.keys() {
        if let Some(name) = key.as_str() {
            if !REQUIRED_FIELDS.contains(&name) {
                debug!(key = name, "Ignoring unknown key");
            }
        }
    }

    let mut values = Vec::with_capacity(REQUIRED_FIELDS.len());
    let mut issues = Vec::new();
    for field in REQUIRED_FIELDS {
        match mapping.get(field) {
            None => issues.push(FieldIssue::new(field, FieldProblem::Missing)),
            Some(Value::Null) => issues.push(FieldIssue::new(field, FieldProblem::Null)),
            Some(Value::String(s)) if s.trim().is_empty() => {
                issues.push(FieldIssue::new(field, FieldProblem::Empty))
            }
            Some(Value::String(s)) => values.push(s.clone()),
            Some(_) => issues.push(FieldIssue::new(field, FieldProblem::NotText)),
        }
    }

    if !issues.is_empty() {
        return Err(DetectionError::Schema { issues });
    }

    // values are in REQUIRED_FIELDS order
    let mut values = values.into_iter();
    let mut next = || values.next().unwrap_or_default();
    DetectionConfig::new(next(), next(), next(), next())
}

/// Walk the document and return the first tag found, if any
fn reject_tags(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Tagged(tagged) => Err(tagged.tag.to_string()),
        Value::Sequence(items) => items.iter().try_for_each(reject_tags),
        Value::Mapping(mapping) => mapping.iter().try_for_each(|(k, v)| {
            reject_tags(k)?;
            reject_tags(v)
        }),
        _ => Ok(()),
    }
}
