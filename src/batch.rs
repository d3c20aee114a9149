//! Per-project batching of job records.
//!
//! Contributors append records to their project's pending list and get back
//! a [`CompletionHandle`]. A fixed-interval tick detaches every idle,
//! non-empty list and flushes it to the [`ReportSink`] in the background.
//!
//! Each project has at most one flush in flight. Detaching swaps out both
//! the pending list and the completion sender under one lock, so a record
//! lands in exactly one batch and its handle resolves with that batch's
//! outcome. Records contributed while a flush is running wait for the next
//! tick.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::JobRecord;
use crate::sink::{BatchReceipt, ReportSink};
use crate::telemetry::{job::start_flush_span, metrics};

/// Outcome published to every contributor of one batch. Errors are carried
/// as text so the outcome can be cloned to each of them.
type FlushOutcome = std::result::Result<BatchReceipt, String>;

/// Resolves once the batch a record was contributed to has been flushed.
#[derive(Debug)]
pub struct CompletionHandle {
    project: String,
    rx: watch::Receiver<Option<FlushOutcome>>,
}

impl CompletionHandle {
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Wait for the flush of this handle's batch.
    ///
    /// # Errors
    ///
    /// [`Error::Flush`] when the reporting call failed or timed out, or the
    /// batch was dropped without being flushed.
    pub async fn wait(mut self) -> Result<BatchReceipt> {
        let outcome = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map(|published| (*published).clone());

        match outcome {
            Ok(Some(Ok(receipt))) => Ok(receipt),
            Ok(Some(Err(message))) => Err(Error::Flush {
                project: self.project,
                message,
            }),
            Ok(None) | Err(_) => Err(Error::Flush {
                project: self.project,
                message: "batch dropped before it was flushed".to_string(),
            }),
        }
    }
}

/// Settings for the batcher.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Period between ticks.
    pub interval: Duration,
    /// Upper bound on one reporting call. Keeps a hung call from pinning a
    /// project in flight forever.
    pub flush_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(30),
        }
    }
}

/// Accumulation state for one project. Lives as long as the batcher.
struct PendingBatch {
    records: Vec<JobRecord>,
    in_flight: bool,
    completion: watch::Sender<Option<FlushOutcome>>,
}

impl PendingBatch {
    fn new() -> Self {
        let (completion, _) = watch::channel(None);
        Self {
            records: Vec::new(),
            in_flight: false,
            completion,
        }
    }

    /// Take the current records and completion sender, leaving a fresh pair
    /// for later contributors, and mark the project in flight.
    fn detach(&mut self) -> (Vec<JobRecord>, watch::Sender<Option<FlushOutcome>>) {
        let (fresh, _) = watch::channel(None);
        let completion = std::mem::replace(&mut self.completion, fresh);
        let records = std::mem::take(&mut self.records);
        self.in_flight = true;
        (records, completion)
    }
}

/// The batching engine.
pub struct Batcher {
    sink: Arc<dyn ReportSink>,
    config: BatchConfig,
    batches: Mutex<HashMap<String, PendingBatch>>,
    shutdown: Notify,
}

impl Batcher {
    pub fn new(sink: Arc<dyn ReportSink>, config: BatchConfig) -> Arc<Self> {
        Arc::new(Self {
            sink,
            config,
            batches: Mutex::new(HashMap::new()),
            shutdown: Notify::new(),
        })
    }

    // The map is never left half-updated while locked, so a poisoned lock
    // still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingBatch>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `record` for `project`. Never waits on a flush.
    pub fn contribute(&self, project: &str, record: JobRecord) -> CompletionHandle {
        let mut batches = self.lock();
        let batch = batches
            .entry(project.to_string())
            .or_insert_with(PendingBatch::new);
        batch.records.push(record);

        CompletionHandle {
            project: project.to_string(),
            rx: batch.completion.subscribe(),
        }
    }

    /// Start a flush for every project that has pending records and no
    /// flush in flight. Returns how many flushes were started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn tick(self: &Arc<Self>) -> usize {
        let detached: Vec<_> = {
            let mut batches = self.lock();
            batches
                .iter_mut()
                .filter(|(_, batch)| !batch.in_flight && !batch.records.is_empty())
                .map(|(project, batch)| {
                    let (records, completion) = batch.detach();
                    (project.clone(), records, completion)
                })
                .collect()
        };

        let started = detached.len();
        for (project, records, completion) in detached {
            let span = start_flush_span(&project, records.len());
            // Owned by the flush future from here on, so the flag is cleared
            // even if spawning or the flush itself panics.
            let in_flight = InFlightGuard {
                batcher: Arc::clone(self),
                project,
            };
            tokio::spawn(Self::flush(in_flight, records, completion).instrument(span));
        }
        started
    }

    async fn flush(
        in_flight: InFlightGuard,
        records: Vec<JobRecord>,
        completion: watch::Sender<Option<FlushOutcome>>,
    ) {
        let started = Instant::now();
        let batcher = &in_flight.batcher;
        let project = in_flight.project.as_str();

        let call = batcher.sink.post_job_batch(project, &records);
        let (outcome, label) = match tokio::time::timeout(batcher.config.flush_timeout, call).await
        {
            Ok(Ok(receipt)) => {
                info!(project, jobs = records.len(), "job batch flushed");
                (Ok(receipt), "ok")
            }
            Ok(Err(e)) => {
                error!(project, jobs = records.len(), error = %e, "job batch flush failed");
                (Err(e.to_string()), "error")
            }
            Err(_) => {
                let timeout_ms = batcher.config.flush_timeout.as_millis() as u64;
                error!(project, jobs = records.len(), timeout_ms, "job batch flush timed out");
                (Err(format!("reporting call timed out after {timeout_ms}ms")), "timeout")
            }
        };

        metrics::batches_flushed().add(1, &[KeyValue::new("result", label)]);
        metrics::flush_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        // Clear the flag first so a contributor woken by the outcome can
        // already get its next batch flushed.
        drop(in_flight);
        completion.send_replace(Some(outcome));
    }

    fn finish(&self, project: &str) {
        match self.lock().get_mut(project) {
            Some(batch) => batch.in_flight = false,
            None => error!(project, "finished a flush for a project with no batch"),
        }
    }

    /// Drive [`tick`](Self::tick) on the configured interval until
    /// [`shutdown`](Self::shutdown) is called. A last tick runs on the way
    /// out so records contributed just before shutdown are still sent.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "batcher started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let started = self.guarded_tick();
                    info!(flushes = started, "batcher shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    let started = self.guarded_tick();
                    if started > 0 {
                        debug!(flushes = started, "tick started flushes");
                    }
                }
            }
        }
    }

    /// A panicking tick is logged and the timer keeps going.
    fn guarded_tick(self: &Arc<Self>) -> usize {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
            Ok(started) => started,
            Err(_) => {
                error!("batcher tick panicked");
                0
            }
        }
    }

    /// Signal [`run`](Self::run) to stop.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Records waiting for the next flush of `project`.
    pub fn pending_len(&self, project: &str) -> usize {
        self.lock().get(project).map_or(0, |b| b.records.len())
    }

    pub fn is_in_flight(&self, project: &str) -> bool {
        self.lock().get(project).is_some_and(|b| b.in_flight)
    }

    /// Number of projects with a flush currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.lock().values().filter(|b| b.in_flight).count()
    }

    /// Wait until no flush is in flight, polling every `poll`, for at most
    /// `limit`. Returns whether the batcher went idle.
    pub async fn wait_idle(&self, poll: Duration, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let busy = self.in_flight_count();
            if busy == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(in_flight = busy, "gave up waiting for in-flight flushes");
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Clears a project's in-flight flag when dropped, including when the
/// flush task unwinds or is never started.
struct InFlightGuard {
    batcher: Arc<Batcher>,
    project: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.batcher.finish(&self.project);
    }
}
