//! Shared fixtures: in-memory task source and report sink, plus builders for
//! task definitions, statuses and events.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobrelay::classify::{Classifier, ClassifierConfig};
use jobrelay::error::{Error, Result};
use jobrelay::event::{EventKind, TaskEvent};
use jobrelay::model::{JobRecord, RouteInfo, TaskDefinition, TaskStatus};
use jobrelay::normalize::Normalizer;
use jobrelay::sink::{BatchReceipt, ReportSink};
use jobrelay::source::{RetryInfo, TaskSource};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

/// Slug for uuid `5b3c8f3e-1e2a-4c6d-9f10-2a3b4c5d6e7f`.
pub const TASK_ID: &str = "WzyPPh4qTG2fECo7TF1ufw";
pub const TASK_UUID: &str = "5b3c8f3e-1e2a-4c6d-9f10-2a3b4c5d6e7f";
pub const GROUP_ID: &str = "aZ8tHx0yS9W2p1f3nQk7Lg";
/// A second task id; any valid slug works.
pub const OTHER_TASK_ID: &str = GROUP_ID;
pub const RETRY_SCHEDULER: &str = "task-graph-scheduler";

pub fn normalizer() -> Normalizer {
    Normalizer::new("https://inspector.example.net", "https://queue.example.net")
}

/// A task definition under `scheduler_id` with a minimal override object.
pub fn task(scheduler_id: &str) -> TaskDefinition {
    serde_json::from_value(json!({
        "provisionerId": "aws-provisioner",
        "workerType": "b2g-desktop",
        "schedulerId": scheduler_id,
        "taskGroupId": GROUP_ID,
        "created": "2026-03-01T12:00:00Z",
        "metadata": {
            "name": "Gaia unit tests",
            "owner": "dev@example.net",
            "source": "https://hg.example.net/gaia"
        },
        "routes": [],
        "extra": {
            "treeherder": {
                "symbol": "Gu",
                "groupSymbol": "G",
                "groupName": "Gaia"
            }
        }
    }))
    .expect("task fixture")
}

/// A run entry; `started`/`resolved` are filled in for settled states.
pub fn run(
    run_id: u32,
    state: &str,
    reason_created: &str,
    reason_resolved: Option<&str>,
) -> Value {
    let mut run = json!({
        "runId": run_id,
        "state": state,
        "reasonCreated": reason_created,
        "workerGroup": "us-west-2",
        "workerId": format!("i-00{run_id}"),
        "scheduled": "2026-03-01T12:00:05Z",
    });
    if state != "pending" && state != "unscheduled" {
        run["started"] = json!("2026-03-01T12:01:00Z");
    }
    if let Some(reason) = reason_resolved {
        run["reasonResolved"] = json!(reason);
        run["resolved"] = json!("2026-03-01T12:10:00Z");
    }
    run
}

pub fn status(scheduler_id: &str, runs: Vec<Value>) -> TaskStatus {
    status_for(TASK_ID, scheduler_id, runs)
}

pub fn status_for(task_id: &str, scheduler_id: &str, runs: Vec<Value>) -> TaskStatus {
    serde_json::from_value(json!({
        "taskId": task_id,
        "schedulerId": scheduler_id,
        "taskGroupId": GROUP_ID,
        "runs": runs,
    }))
    .expect("status fixture")
}

pub fn route() -> RouteInfo {
    RouteInfo {
        project: "gaia".to_string(),
        revision: "4c9a1e0b7d2f".to_string(),
        revision_hash: "rh-77".to_string(),
    }
}

pub fn event(kind: EventKind, run_id: u32, status: &TaskStatus, routes: &[&str]) -> TaskEvent {
    serde_json::from_value(json!({
        "kind": kind,
        "routes": routes,
        "payload": {
            "status": status,
            "runId": run_id,
        }
    }))
    .expect("event fixture")
}

pub fn classifier(tasks: Arc<FakeTaskSource>) -> Classifier {
    Classifier::new(
        normalizer(),
        tasks,
        ClassifierConfig {
            retry_scheduler_id: RETRY_SCHEDULER.to_string(),
            inspection_timeout: Duration::from_secs(10),
        },
    )
}

/// How the fake scheduler answers retry inspection.
#[derive(Debug, Clone, Copy)]
pub enum Inspection {
    Reruns(u32),
    Fail,
    Hang,
}

/// Serves one fixed task definition and counts scheduler queries.
pub struct FakeTaskSource {
    task: Option<TaskDefinition>,
    inspection: Inspection,
    inspections: AtomicUsize,
}

impl FakeTaskSource {
    pub fn new(task: TaskDefinition, inspection: Inspection) -> Arc<Self> {
        Arc::new(Self {
            task: Some(task),
            inspection,
            inspections: AtomicUsize::new(0),
        })
    }

    /// A source that knows no tasks.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            task: None,
            inspection: Inspection::Fail,
            inspections: AtomicUsize::new(0),
        })
    }

    pub fn inspections(&self) -> usize {
        self.inspections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskSource for FakeTaskSource {
    async fn fetch_task(&self, task_id: &str) -> Result<TaskDefinition> {
        self.task
            .clone()
            .ok_or_else(|| Error::Other(format!("task {task_id} not found")))
    }

    async fn inspect_retry_count(&self, _task_group_id: &str, _task_id: &str) -> Result<RetryInfo> {
        self.inspections.fetch_add(1, Ordering::SeqCst);
        match self.inspection {
            Inspection::Reruns(reruns) => Ok(RetryInfo { reruns }),
            Inspection::Fail => Err(Error::RetryInspection("scheduler returned 404".to_string())),
            Inspection::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(RetryInfo { reruns: 0 })
            }
        }
    }
}

/// Keeps every batch it receives.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<JobRecord>)>>,
    gate: Option<Semaphore>,
}

impl MemorySink {
    /// A sink that holds each post until [`MemorySink::release`] is called.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::default(),
            gate: Some(Semaphore::new(0)),
        })
    }

    /// Let one held post through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn batches(&self) -> Vec<(String, Vec<JobRecord>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn post_job_batch(&self, project: &str, records: &[JobRecord]) -> Result<BatchReceipt> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.batches
            .lock()
            .unwrap()
            .push((project.to_string(), records.to_vec()));
        Ok(BatchReceipt {
            project: project.to_string(),
            jobs: records.len(),
            response: json!({ "message": "well-formed JSON stored" }),
        })
    }
}
