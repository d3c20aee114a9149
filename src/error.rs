//! Error types for jobrelay.

use std::fmt;

use thiserror::Error;

/// A single schema violation found while normalizing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field, e.g. `build.platform`.
    pub path: String,
    pub reason: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Every violation collected for one job, reported together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// Does any violation point at `path`?
    pub fn mentions(&self, path: &str) -> bool {
        self.0.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("job validation failed: {0}")]
    Validation(Violations),

    #[error("route resolution failed: {0}")]
    RouteResolution(String),

    #[error("retry inspection failed: {0}")]
    RetryInspection(String),

    #[error("flush for project {project} failed: {message}")]
    Flush { project: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a validation error carrying a single violation.
    pub fn violation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation(Violations(vec![Violation::new(path, reason)]))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
