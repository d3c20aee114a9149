//! Reporting service client.
//!
//! Jobs are posted per project as a JSON array of submissions:
//! `POST {REPORTING_URL}/project/{project}/jobs/`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::secrets::{ExposeSecret, SecretString};
use crate::error::{Error, Result};
use crate::model::JobRecord;

/// What the reporting service said about an accepted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub project: String,
    pub jobs: usize,
    /// Response body, or `Null` when the service returned none.
    pub response: serde_json::Value,
}

/// Destination for batches of job records.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Submit every record of one batch for `project`.
    ///
    /// Any error is final for the batch; callers do not re-queue.
    async fn post_job_batch(&self, project: &str, records: &[JobRecord]) -> Result<BatchReceipt>;
}

#[derive(Debug, Serialize)]
struct JobSubmission<'a> {
    project: &'a str,
    revision: &'a str,
    revision_hash: &'a str,
    job: &'a JobRecord,
}

/// [`ReportSink`] posting to the reporting service's HTTP API.
pub struct HttpReportSink {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: SecretString,
}

impl HttpReportSink {
    const MAX_ATTEMPTS: usize = 3;
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(base_url: &str, client_id: impl Into<String>, secret: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            secret,
        })
    }

    fn flush_error(project: &str, message: impl Into<String>) -> Error {
        Error::Flush {
            project: project.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn post_job_batch(&self, project: &str, records: &[JobRecord]) -> Result<BatchReceipt> {
        let endpoint = format!("{}/project/{project}/jobs/", self.base_url);
        let body: Vec<JobSubmission<'_>> = records
            .iter()
            .map(|job| JobSubmission {
                project,
                revision: &job.revision,
                revision_hash: &job.revision_hash,
                job,
            })
            .collect();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let response = self
                .client
                .post(&endpoint)
                .bearer_auth(self.secret.expose_secret())
                .header("X-Client-Id", &self.client_id)
                .json(&body)
                .timeout(Self::REQUEST_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let response = match resp.text().await {
                        Ok(text) => response_body(project, &text),
                        Err(e) => {
                            debug!(project, error = %e, "could not read job batch response");
                            serde_json::Value::Null
                        }
                    };
                    debug!(project, jobs = records.len(), attempt, "job batch accepted");
                    return Ok(BatchReceipt {
                        project: project.to_string(),
                        jobs: records.len(),
                        response,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    let retryable = status.as_u16() == 429 || status.is_server_error();

                    if retryable && attempt < Self::MAX_ATTEMPTS {
                        let backoff_ms = (250_u64 << (attempt - 1)).min(2_000);
                        warn!(project, %status, attempt, backoff_ms, "retrying job batch");
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    return Err(Self::flush_error(
                        project,
                        format!("reporting service returned {status}: {body}"),
                    ));
                }
                Err(err) => {
                    // Timeouts are not retried; the batcher bounds the whole flush.
                    if !err.is_timeout() && attempt < Self::MAX_ATTEMPTS {
                        warn!(project, attempt, error = %err, "retrying job batch");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                    return Err(Self::flush_error(project, format!("request failed: {err}")));
                }
            }
        }
    }
}

/// Parse an accepted batch's response body. An empty or malformed body
/// becomes `Null`; the batch itself still counts as delivered.
fn response_body(project: &str, text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(project, error = %e, "job batch response is not JSON");
        serde_json::Value::Null
    })
}
