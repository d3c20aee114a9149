//! Upstream task definitions and run status, as served by the task service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Task Definition
// ---------------------------------------------------------------------------

/// The immutable definition of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(default)]
    pub provisioner_id: Option<String>,

    /// Seeds the default build and machine platform.
    #[serde(default)]
    pub worker_type: Option<String>,

    /// Scheduler that created the task. Only one scheduler supports
    /// retry inspection.
    #[serde(default)]
    pub scheduler_id: Option<String>,

    #[serde(default)]
    pub task_group_id: Option<String>,

    pub created: DateTime<Utc>,

    pub metadata: TaskMetadata,

    #[serde(default)]
    pub routes: Vec<String>,

    /// Free-form extension data. The job override object lives under
    /// `extra.treeherder`.
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

// ---------------------------------------------------------------------------
// Task Status / Runs
// ---------------------------------------------------------------------------

/// Status snapshot carried by every lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: String,
    #[serde(default)]
    pub scheduler_id: Option<String>,
    #[serde(default)]
    pub task_group_id: Option<String>,
    #[serde(default)]
    pub runs: Vec<Run>,
}

impl TaskStatus {
    /// Look up a run by its index.
    pub fn run(&self, run_id: u32) -> Option<&Run> {
        self.runs.iter().find(|r| r.run_id == run_id)
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: u32,
    pub state: RunState,
    pub reason_created: ReasonCreated,
    #[serde(default)]
    pub reason_resolved: Option<ReasonResolved>,
    #[serde(default)]
    pub worker_group: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    pub scheduled: DateTime<Utc>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Unscheduled,
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Unscheduled => "unscheduled",
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Exception => "exception",
        };
        write!(f, "{s}")
    }
}

/// Why a run was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCreated {
    Scheduled,
    Retry,
    TaskRetry,
    Rerun,
    /// Created automatically after an earlier run hit an exception.
    Exception,
    #[serde(other)]
    Other,
}

impl ReasonCreated {
    /// Does this run replace an earlier run of the same task?
    pub fn is_rerun(self) -> bool {
        matches!(self, ReasonCreated::Rerun | ReasonCreated::Retry)
    }
}

/// Why a run was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonResolved {
    Completed,
    Failed,
    DeadlineExceeded,
    Canceled,
    Superseded,
    ClaimExpired,
    WorkerShutdown,
    MalformedPayload,
    ResourceUnavailable,
    InternalError,
    IntermittentTask,
    #[serde(other)]
    Other,
}
