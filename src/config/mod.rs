//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The reporting secret is wrapped in `SecretString` so it never
//! shows up in logs.

pub mod secrets;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::batch::BatchConfig;
use crate::classify::ClassifierConfig;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    /// Task service API base; also serves run logs.
    pub task_service_url: String,
    /// Retry-capable scheduler API base. Defaults to the task service.
    pub scheduler_url: String,
    /// Task inspection UI base, linked from every job.
    pub inspector_url: String,
    pub reporting_url: String,
    pub reporting_client_id: String,
    pub reporting_secret: SecretString,
    pub route_prefix: String,
    pub retry_scheduler_id: String,
    pub flush_interval: Duration,
    pub flush_timeout: Duration,
    pub inspection_timeout: Duration,
    pub projects_file: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let task_service_url = required_var("TASK_SERVICE_URL")?;
        Ok(Self {
            scheduler_url: optional_var("SCHEDULER_URL")
                .unwrap_or_else(|| task_service_url.clone()),
            task_service_url,
            inspector_url: optional_var("INSPECTOR_URL")
                .unwrap_or_else(|| "https://tools.taskcluster.net/task-inspector".to_string()),
            reporting_url: required_var("REPORTING_URL")?,
            reporting_client_id: required_var("REPORTING_CLIENT_ID")?,
            reporting_secret: SecretString::from(required_var("REPORTING_SECRET")?),
            route_prefix: optional_var("ROUTE_PREFIX").unwrap_or_else(|| "treeherder".to_string()),
            retry_scheduler_id: optional_var("RETRY_SCHEDULER_ID")
                .unwrap_or_else(|| "task-graph-scheduler".to_string()),
            flush_interval: Duration::from_millis(parsed_var("FLUSH_INTERVAL_MS", 1_000)?),
            flush_timeout: Duration::from_secs(parsed_var("FLUSH_TIMEOUT_SECS", 30)?),
            inspection_timeout: Duration::from_secs(parsed_var("INSPECTION_TIMEOUT_SECS", 10)?),
            projects_file: optional_var("PROJECTS_FILE").map(PathBuf::from),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: parsed_var("LOG_JSON", false)?,
        })
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            interval: self.flush_interval,
            flush_timeout: self.flush_timeout,
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            retry_scheduler_id: self.retry_scheduler_id.clone(),
            inspection_timeout: self.inspection_timeout,
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are treated the same.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
    }
}
