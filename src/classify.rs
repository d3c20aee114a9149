//! Lifecycle classifier.
//!
//! Decides, per event, which job records (if any) to report and what state
//! and result they carry. Special cases:
//!
//! - a `pending` rerun first marks the run it replaces as `retry`;
//! - an `exception` on a run that was itself created by an exception is
//!   suppressed;
//! - a `failed` run that the retry-capable scheduler is about to rerun is
//!   suppressed, the rerun's `pending` event reports it instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::EventKind;
use crate::model::{
    JobRecord, JobResult, JobState, ReasonCreated, ReasonResolved, RouteInfo, Run, RunState,
    TaskDefinition, TaskStatus,
};
use crate::normalize::Normalizer;
use crate::source::TaskSource;

/// Map a run state onto the dashboard's job state.
pub fn job_state(state: RunState) -> JobState {
    match state {
        RunState::Exception | RunState::Failed | RunState::Completed => JobState::Completed,
        RunState::Running => JobState::Running,
        RunState::Pending | RunState::Unscheduled => JobState::Pending,
    }
}

/// Map a run onto the dashboard's job result.
pub fn job_result(run: &Run) -> JobResult {
    match run.state {
        RunState::Completed => JobResult::Success,
        RunState::Failed => JobResult::Testfailed,
        RunState::Exception if run.reason_resolved == Some(ReasonResolved::Canceled) => {
            JobResult::Usercancel
        }
        RunState::Exception => JobResult::Exception,
        _ => JobResult::Unknown,
    }
}

/// Why an event produced no jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// The excepted run was created automatically after an earlier exception.
    AutoException,
    /// The scheduler has already recorded a rerun past this run.
    AwaitingRerun { reruns: u32, run_id: u32 },
}

impl Suppression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Suppression::AutoException => "auto_exception",
            Suppression::AwaitingRerun { .. } => "awaiting_rerun",
        }
    }
}

/// What the classifier decided for one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Report these records, in order.
    Report(Vec<JobRecord>),
    Suppressed(Suppression),
}

/// Settings for the classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Scheduler id whose task groups support retry inspection.
    pub retry_scheduler_id: String,
    /// Upper bound on one retry inspection query.
    pub inspection_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            retry_scheduler_id: "task-graph-scheduler".to_string(),
            inspection_timeout: Duration::from_secs(10),
        }
    }
}

/// Everything the classifier needs to know about one event.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    pub kind: EventKind,
    pub route: &'a RouteInfo,
    pub task_id: &'a str,
    pub task: &'a TaskDefinition,
    pub status: &'a TaskStatus,
    pub run_id: u32,
}

pub struct Classifier {
    normalizer: Normalizer,
    tasks: Arc<dyn TaskSource>,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(
        normalizer: Normalizer,
        tasks: Arc<dyn TaskSource>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            normalizer,
            tasks,
            config,
        }
    }

    /// Classify one lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a record cannot be normalized,
    /// including when the event's run (or the run a rerun replaces) is
    /// missing from the status.
    pub async fn classify(&self, ctx: EventContext<'_>) -> Result<Classification> {
        let run = find_run(ctx.status, ctx.run_id)?;

        match ctx.kind {
            EventKind::Pending => self.pending(&ctx, run),
            EventKind::Running => Ok(Classification::Report(vec![self.record(&ctx, run, false)?])),
            EventKind::Exception => {
                if run.reason_created == ReasonCreated::Exception {
                    debug!(
                        task_id = ctx.task_id,
                        run_id = ctx.run_id,
                        "auto-created exception run suppressed"
                    );
                    return Ok(Classification::Suppressed(Suppression::AutoException));
                }
                Ok(Classification::Report(vec![self.record(&ctx, run, false)?]))
            }
            EventKind::Failed => {
                if let Some(reruns) = self.pending_reruns(&ctx).await {
                    if reruns > ctx.run_id {
                        debug!(
                            task_id = ctx.task_id,
                            run_id = ctx.run_id,
                            reruns,
                            "failed run awaiting rerun"
                        );
                        return Ok(Classification::Suppressed(Suppression::AwaitingRerun {
                            reruns,
                            run_id: ctx.run_id,
                        }));
                    }
                }
                Ok(Classification::Report(vec![self.record(&ctx, run, true)?]))
            }
            EventKind::Completed => Ok(Classification::Report(vec![self.record(&ctx, run, true)?])),
        }
    }

    fn pending(&self, ctx: &EventContext<'_>, run: &Run) -> Result<Classification> {
        let mut records = Vec::with_capacity(2);

        if run.reason_created.is_rerun() && ctx.run_id > 0 {
            let previous = find_run(ctx.status, ctx.run_id - 1)?;
            let mut retried = self.record(ctx, previous, true)?;
            retried.state = JobState::Completed;
            retried.result = JobResult::Retry;
            records.push(retried);
        }

        records.push(self.record(ctx, run, false)?);
        Ok(Classification::Report(records))
    }

    /// Normalize `run`, apply the state/result mapping and stamp the route's
    /// revision onto it.
    fn record(&self, ctx: &EventContext<'_>, run: &Run, with_log: bool) -> Result<JobRecord> {
        let mut record = self.normalizer.normalize(ctx.task_id, ctx.task, run)?;
        record.state = job_state(run.state);
        record.result = job_result(run);
        if !ctx.route.revision.is_empty() {
            record.revision = ctx.route.revision.clone();
        }
        if !ctx.route.revision_hash.is_empty() {
            record.revision_hash = ctx.route.revision_hash.clone();
        }
        if with_log {
            record
                .log_references
                .push(self.normalizer.log_reference(ctx.task_id, run.run_id));
        }
        Ok(record)
    }

    /// Reruns recorded by the retry-capable scheduler, or `None` when the
    /// task is outside its domain or the query fails.
    async fn pending_reruns(&self, ctx: &EventContext<'_>) -> Option<u32> {
        let scheduler_id = ctx
            .task
            .scheduler_id
            .as_deref()
            .or(ctx.status.scheduler_id.as_deref());
        if scheduler_id != Some(self.config.retry_scheduler_id.as_str()) {
            return None;
        }
        let group = ctx
            .task
            .task_group_id
            .as_deref()
            .or(ctx.status.task_group_id.as_deref())?;

        let query = self.tasks.inspect_retry_count(group, ctx.task_id);
        match tokio::time::timeout(self.config.inspection_timeout, query).await {
            Ok(Ok(info)) => Some(info.reruns),
            Ok(Err(e)) => {
                warn!(
                    task_id = ctx.task_id,
                    task_group_id = group,
                    error = %e,
                    "retry inspection failed, reporting failure as-is"
                );
                None
            }
            Err(_) => {
                warn!(
                    task_id = ctx.task_id,
                    task_group_id = group,
                    timeout_ms = self.config.inspection_timeout.as_millis() as u64,
                    "retry inspection timed out, reporting failure as-is"
                );
                None
            }
        }
    }
}

fn find_run(status: &TaskStatus, run_id: u32) -> Result<&Run> {
    status
        .run(run_id)
        .ok_or_else(|| Error::violation("status.runs", format!("run {run_id} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn run(state: RunState, reason_resolved: Option<ReasonResolved>) -> Run {
        Run {
            run_id: 0,
            state,
            reason_created: ReasonCreated::Scheduled,
            reason_resolved,
            worker_group: None,
            worker_id: None,
            scheduled: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            started: None,
            resolved: None,
        }
    }

    #[test]
    fn state_mapping() {
        assert_eq!(job_state(RunState::Exception), JobState::Completed);
        assert_eq!(job_state(RunState::Failed), JobState::Completed);
        assert_eq!(job_state(RunState::Completed), JobState::Completed);
        assert_eq!(job_state(RunState::Running), JobState::Running);
        assert_eq!(job_state(RunState::Pending), JobState::Pending);
    }

    #[test]
    fn result_mapping() {
        assert_eq!(job_result(&run(RunState::Completed, None)), JobResult::Success);
        assert_eq!(job_result(&run(RunState::Failed, None)), JobResult::Testfailed);
        assert_eq!(
            job_result(&run(RunState::Exception, Some(ReasonResolved::Canceled))),
            JobResult::Usercancel
        );
        assert_eq!(
            job_result(&run(RunState::Exception, Some(ReasonResolved::WorkerShutdown))),
            JobResult::Exception
        );
        assert_eq!(job_result(&run(RunState::Running, None)), JobResult::Unknown);
        assert_eq!(job_result(&run(RunState::Pending, None)), JobResult::Unknown);
    }
}
