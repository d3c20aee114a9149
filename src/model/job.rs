//! Job records as accepted by the reporting service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Job Record
// ---------------------------------------------------------------------------

/// The canonical unit pushed downstream. One per (task, run) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// `<task uuid>/<run id>`. Stable across repeated events for the same run.
    pub job_guid: String,

    pub build_platform: Platform,
    pub machine_platform: Platform,

    /// Identifier of the worker that executed the run.
    pub machine: String,

    /// Human-readable job name, at most [`MAX_JOB_NAME_CHARS`] characters.
    pub name: String,

    pub reason: String,

    pub job_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,

    pub tier: u32,

    /// Named build configuration axes, e.g. `{"opt": true}`.
    pub option_collection: BTreeMap<String, bool>,

    pub revision: String,
    pub revision_hash: String,

    /// Unix seconds.
    pub submit_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,

    /// Owner of the task.
    pub who: String,

    pub state: JobState,
    pub result: JobResult,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_references: Vec<LogReference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<JobArtifact>,
}

/// Destination-imposed limit on job names.
pub const MAX_JOB_NAME_CHARS: usize = 99;

/// Build or machine platform descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub platform: String,
    pub os_name: String,
    pub architecture: String,
}

/// A pointer to a log produced by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogReference {
    pub name: String,
    pub url: String,
}

/// Structured metadata attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobArtifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub blob: serde_json::Value,
}

// ---------------------------------------------------------------------------
// State / Result
// ---------------------------------------------------------------------------

/// Lifecycle state of a job as the dashboard understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResult {
    Success,
    Testfailed,
    Usercancel,
    Exception,
    /// Superseded by a rerun of the same task.
    Retry,
    /// Not finished yet.
    Unknown,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobResult::Success => "success",
            JobResult::Testfailed => "testfailed",
            JobResult::Usercancel => "usercancel",
            JobResult::Exception => "exception",
            JobResult::Retry => "retry",
            JobResult::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}
