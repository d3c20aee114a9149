//! Record normalizer: turns a task definition and one of its runs into a
//! validated [`JobRecord`].
//!
//! Defaults are seeded from the task itself (worker type, worker id), the
//! task's override object is layered on top, and the result is checked
//! against [`schema::JOB_SCHEMA`]. Either every field validates and a full
//! record comes back, or the caller gets every violation at once.

pub mod schema;

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{Error, Result, Violation, Violations};
use crate::model::{
    JobArtifact, JobRecord, JobResult, JobState, LogReference, MAX_JOB_NAME_CHARS, Platform, Run,
    TaskDefinition,
};

/// Key under `task.extra` holding the job override object.
pub const OVERRIDE_KEY: &str = "treeherder";

/// Name the dashboard expects for the primary run log.
pub const LOG_NAME: &str = "builds-4h";

const LOG_ARTIFACT: &str = "public/logs/live_backing.log";

/// Typed view of the document once it has passed validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobFields {
    build: Platform,
    machine: Platform,
    symbol: String,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    group_symbol: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    reason: String,
    tier: u32,
    collection: BTreeMap<String, bool>,
    #[serde(default)]
    revision: String,
    #[serde(default)]
    revision_hash: String,
}

/// Builds job records and the links they carry.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Base URL of the task inspection UI.
    inspector_url: String,
    /// Base URL of the task service API; logs are served from it.
    task_service_url: String,
}

impl Normalizer {
    pub fn new(inspector_url: impl Into<String>, task_service_url: impl Into<String>) -> Self {
        Self {
            inspector_url: inspector_url.into().trim_end_matches('/').to_string(),
            task_service_url: task_service_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Normalize one run of a task into a job record.
    ///
    /// State and result are provisional (`pending` / `unknown`); the
    /// classifier decides them. Revision fields come from the override
    /// object when it sets them and are otherwise empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] with every violation found when the
    /// merged document does not satisfy the schema, when the task id is not
    /// a valid slug, or when the run resolved before it started.
    pub fn normalize(&self, task_id: &str, task: &TaskDefinition, run: &Run) -> Result<JobRecord> {
        let mut violations = Vec::new();

        let mut doc = seed(task);
        match task.extra.get(OVERRIDE_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::Object(overrides)) => {
                let mut overrides = Value::Object(overrides.clone());
                rename_os(&mut overrides);
                merge(&mut doc, &overrides);
            }
            Some(_) => violations.push(Violation::new(
                format!("extra.{OVERRIDE_KEY}"),
                "must be an object",
            )),
        }
        coerce_symbol(&mut doc);

        if let Err(found) = schema::validate(&mut doc, schema::JOB_SCHEMA) {
            violations.extend(found);
        }

        let guid = job_guid(task_id, run.run_id);
        if let Err(violation) = &guid {
            violations.push(violation.clone());
        }

        let start_timestamp = run.started.map(unix_seconds);
        let end_timestamp = run.resolved.map(unix_seconds);
        if let (Some(start), Some(end)) = (start_timestamp, end_timestamp) {
            if end < start {
                violations.push(Violation::new("run.resolved", "precedes run.started"));
            }
        }

        if !violations.is_empty() {
            return Err(Error::Validation(Violations(violations)));
        }
        let job_guid = guid.map_err(|v| Error::Validation(Violations(vec![v])))?;
        let fields: JobFields = serde_json::from_value(doc)?;

        Ok(JobRecord {
            job_guid,
            build_platform: fields.build,
            machine_platform: fields.machine,
            machine: run
                .worker_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            name: truncate_name(&task.metadata.name),
            reason: fields.reason,
            job_symbol: fields.symbol,
            group_name: fields.group_name,
            group_symbol: fields.group_symbol,
            product_name: fields.product_name,
            tier: fields.tier,
            option_collection: fields.collection,
            revision: fields.revision,
            revision_hash: fields.revision_hash,
            submit_timestamp: unix_seconds(task.created),
            start_timestamp,
            end_timestamp,
            who: task.metadata.owner.clone(),
            state: JobState::Pending,
            result: JobResult::Unknown,
            log_references: Vec::new(),
            artifacts: vec![self.inspect_artifact(task_id, run.run_id)],
        })
    }

    /// Link to the primary log of a run.
    pub fn log_reference(&self, task_id: &str, run_id: u32) -> LogReference {
        LogReference {
            name: LOG_NAME.to_string(),
            url: format!(
                "{}/task/{task_id}/runs/{run_id}/artifacts/{LOG_ARTIFACT}",
                self.task_service_url
            ),
        }
    }

    /// Deep link into the inspection UI for a run.
    pub fn inspect_url(&self, task_id: &str, run_id: u32) -> String {
        format!("{}/#{task_id}/{run_id}", self.inspector_url)
    }

    fn inspect_artifact(&self, task_id: &str, run_id: u32) -> JobArtifact {
        JobArtifact {
            kind: "json".to_string(),
            name: "Job Info".to_string(),
            blob: json!({
                "job_details": [{
                    "content_type": "link",
                    "url": self.inspect_url(task_id, run_id),
                    "value": "Inspect Task",
                    "title": "Inspect Task",
                }]
            }),
        }
    }
}

/// Stable job identifier for a (task, run) pair.
///
/// Task ids are 22-character URL-safe base64 encodings of a UUID; the
/// identifier uses the hyphenated UUID form.
pub fn job_guid(task_id: &str, run_id: u32) -> std::result::Result<String, Violation> {
    let uuid = slug_to_uuid(task_id)
        .ok_or_else(|| Violation::new("taskId", format!("{task_id:?} is not a valid slug")))?;
    Ok(format!("{}/{run_id}", uuid.hyphenated()))
}

fn slug_to_uuid(slug: &str) -> Option<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(slug).ok()?;
    Uuid::from_slice(&bytes).ok()
}

fn seed(task: &TaskDefinition) -> Value {
    let mut doc = json!({
        "revision": "",
        "revisionHash": "",
    });
    if let Some(worker_type) = &task.worker_type {
        doc["build"] = json!({ "platform": worker_type });
        doc["machine"] = json!({ "platform": worker_type });
    }
    doc
}

/// Layer `overlay` onto `base`. Objects merge key by key, anything else in
/// the overlay replaces what was there.
fn merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let nested = value.is_object() && base.get(key).is_some_and(Value::is_object);
                match base.get_mut(key) {
                    Some(existing) if nested => merge(existing, value),
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Overrides spell the platform OS as `os`; the record calls it `os_name`.
fn rename_os(overrides: &mut Value) {
    for section in ["build", "machine"] {
        if let Some(platform) = overrides.get_mut(section).and_then(Value::as_object_mut) {
            if let Some(os) = platform.remove("os") {
                platform.entry("os_name").or_insert(os);
            }
        }
    }
}

/// Chunk numbers often arrive as bare integers.
fn coerce_symbol(doc: &mut Value) {
    let coerced = match doc.get("symbol") {
        Some(Value::Number(n)) => n.to_string(),
        _ => return,
    };
    doc["symbol"] = Value::String(coerced);
}

fn truncate_name(name: &str) -> String {
    name.chars().take(MAX_JOB_NAME_CHARS).collect()
}

fn unix_seconds(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}
