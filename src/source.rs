//! Task service client: task definitions and retry inspection.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::TaskDefinition;

/// Rerun bookkeeping reported by the retry-capable scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryInfo {
    /// Number of reruns recorded for the task so far.
    pub reruns: u32,
}

/// Where task definitions and retry information come from.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Fetch the full definition of a task.
    async fn fetch_task(&self, task_id: &str) -> Result<TaskDefinition>;

    /// Ask the scheduler how many reruns it has recorded for a task.
    ///
    /// Fails when the task group is not managed by the retry-capable
    /// scheduler.
    async fn inspect_retry_count(&self, task_group_id: &str, task_id: &str) -> Result<RetryInfo>;
}

/// [`TaskSource`] backed by the task service and scheduler HTTP APIs.
#[derive(Debug, Clone)]
pub struct HttpTaskSource {
    client: reqwest::Client,
    task_service_url: String,
    scheduler_url: String,
}

impl HttpTaskSource {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(task_service_url: &str, scheduler_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            task_service_url: task_service_url.trim_end_matches('/').to_string(),
            scheduler_url: scheduler_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn fetch_task(&self, task_id: &str) -> Result<TaskDefinition> {
        let url = format!("{}/task/{task_id}", self.task_service_url);
        debug!(%url, "fetching task definition");
        let task = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<TaskDefinition>()
            .await?;
        Ok(task)
    }

    async fn inspect_retry_count(&self, task_group_id: &str, task_id: &str) -> Result<RetryInfo> {
        let url = format!(
            "{}/task-graph/{task_group_id}/inspect/{task_id}",
            self.scheduler_url
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::RetryInspection(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::RetryInspection(format!(
                "scheduler returned {status} for task group {task_group_id}"
            )));
        }

        resp.json::<RetryInfo>()
            .await
            .map_err(|e| Error::RetryInspection(format!("bad inspection response: {e}")))
    }
}
