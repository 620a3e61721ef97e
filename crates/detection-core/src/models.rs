//! The validated detection rule

use serde::Serialize;
use std::fmt;

use crate::{DetectionError, Result};

/// Keys every detection document must define, in the order they are reported
pub const REQUIRED_FIELDS: [&str; 4] = ["title", "description", "sql_search", "source_table"];

/// A detection rule whose four fields are known to be present and non-empty
///
/// Values are kept exactly as written in the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionConfig {
    title: String,
    description: String,
    sql_search: String,
    source_table: String,
}

impl DetectionConfig {
    /// Build a config, rejecting any field that is empty or whitespace-only
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        sql_search: impl Into<String>,
        source_table: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            title: title.into(),
            description: description.into(),
            sql_search: sql_search.into(),
            source_table: source_table.into(),
        };

        let issues: Vec<FieldIssue> = [
            ("title", &config.title),
            ("description", &config.description),
            ("sql_search", &config.sql_search),
            ("source_table", &config.source_table),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| FieldIssue::new(field, FieldProblem::Empty))
        .collect();

        if !issues.is_empty() {
            return Err(DetectionError::Schema { issues });
        }
        Ok(config)
    }

    /// Detection rule title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// What the detection is looking for
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The search query, passed through unparsed
    pub fn sql_search(&self) -> &str {
        &self.sql_search
    }

    /// Log table the search runs against
    pub fn source_table(&self) -> &str {
        &self.source_table
    }
}

/// Why a required field was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    /// Key not present
    Missing,
    /// Key present with a null value
    Null,
    /// Value is a number, list, mapping, etc.
    NotText,
    /// Empty or whitespace-only string
    Empty,
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => write!(f, "missing"),
            FieldProblem::Null => write!(f, "null"),
            FieldProblem::NotText => write!(f, "not a string"),
            FieldProblem::Empty => write!(f, "empty"),
        }
    }
}

/// A required field together with what is wrong with it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Document key
    pub field: &'static str,
    /// What is wrong
    pub problem: FieldProblem,
}

impl FieldIssue {
    /// Create a new issue
    pub fn new(field: &'static str, problem: FieldProblem) -> Self {
        Self { field, problem }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.problem)
    }
}
