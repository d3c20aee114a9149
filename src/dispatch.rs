//! Event dispatcher: the glue between the event source and the batcher.
//!
//! For each event: resolve the project from the routes, fetch the task,
//! classify, and contribute the resulting records. Per-event failures are
//! logged and never escalate.
//!
//! [`EventLanes`] feeds a dispatcher from a stream: events of one task are
//! handled in arrival order, different tasks concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, warn};

use crate::batch::{Batcher, CompletionHandle};
use crate::classify::{Classification, Classifier, EventContext};
use crate::error::{Error, Result};
use crate::event::TaskEvent;
use crate::projects::ProjectRegistry;
use crate::route;
use crate::source::TaskSource;
use crate::telemetry::{job, metrics};

/// What became of one event.
#[derive(Debug)]
pub enum Dispatched {
    /// Records were queued; one handle per record, in contribution order.
    Reported(Vec<CompletionHandle>),
    /// The classifier chose not to report this event.
    Suppressed,
    /// The event could not be attributed to a reportable project.
    Dropped(String),
}

impl Dispatched {
    /// Completion handles for the contributed records, if any.
    pub fn into_handles(self) -> Vec<CompletionHandle> {
        match self {
            Dispatched::Reported(handles) => handles,
            _ => Vec::new(),
        }
    }
}

pub struct Dispatcher {
    tasks: Arc<dyn TaskSource>,
    classifier: Classifier,
    batcher: Arc<Batcher>,
    projects: Arc<ProjectRegistry>,
    route_prefix: String,
}

impl Dispatcher {
    pub fn new(
        tasks: Arc<dyn TaskSource>,
        classifier: Classifier,
        batcher: Arc<Batcher>,
        projects: Arc<ProjectRegistry>,
        route_prefix: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            classifier,
            batcher,
            projects,
            route_prefix: route_prefix.into(),
        }
    }

    /// Handle one lifecycle event.
    ///
    /// Unroutable events, unknown projects and unknown runs are dropped
    /// with a log line and reported as [`Dispatched::Dropped`].
    ///
    /// # Errors
    ///
    /// Fetching the task or normalizing a record failed. Nothing has been
    /// contributed for the event in that case.
    pub async fn handle(&self, event: &TaskEvent) -> Result<Dispatched> {
        let span = job::start_event_span(event.kind.as_str(), event.task_id(), event.run_id());
        metrics::events_received().add(1, &[KeyValue::new("kind", event.kind.as_str())]);

        let result = self.handle_inner(event, &span).instrument(span.clone()).await;
        match &result {
            Ok(Dispatched::Reported(_)) => job::record_outcome(&span, "reported"),
            Ok(Dispatched::Suppressed) => job::record_outcome(&span, "suppressed"),
            Ok(Dispatched::Dropped(_)) => job::record_outcome(&span, "dropped"),
            Err(_) => job::record_outcome(&span, "failed"),
        }
        result
    }

    async fn handle_inner(&self, event: &TaskEvent, span: &tracing::Span) -> Result<Dispatched> {
        let task_id = event.task_id();

        let route = match route::resolve(&event.routes, &self.route_prefix) {
            Ok(route) => route,
            Err(e) => {
                warn!(task_id, error = %e, "dropping event without a usable route");
                return Ok(self.dropped("route", e));
            }
        };
        job::record_project(span, &route.project);

        if !self.projects.accepts(&route.project) {
            info!(task_id, project = %route.project, "dropping event for unknown project");
            return Ok(self.dropped(
                "unknown_project",
                Error::RouteResolution(format!("project {} is not reported", route.project)),
            ));
        }

        if event.payload.status.run(event.run_id()).is_none() {
            warn!(
                task_id,
                run_id = event.run_id(),
                "dropping event for a run missing from its status"
            );
            return Ok(self.dropped(
                "missing_run",
                Error::Other(format!("run {} not in status", event.run_id())),
            ));
        }

        let task = self.tasks.fetch_task(task_id).await.inspect_err(|e| {
            warn!(task_id, error = %e, "failed to fetch task definition");
            metrics::events_dropped().add(1, &[KeyValue::new("reason", "fetch")]);
        })?;

        let ctx = EventContext {
            kind: event.kind,
            route: &route,
            task_id,
            task: &task,
            status: &event.payload.status,
            run_id: event.run_id(),
        };
        let classification = self.classifier.classify(ctx).await.inspect_err(|e| {
            warn!(task_id, error = %e, "event failed normalization");
            metrics::events_dropped().add(1, &[KeyValue::new("reason", "invalid")]);
        })?;

        match classification {
            Classification::Suppressed(reason) => {
                metrics::events_suppressed().add(
                    1,
                    &[
                        KeyValue::new("kind", event.kind.as_str()),
                        KeyValue::new("reason", reason.as_str()),
                    ],
                );
                Ok(Dispatched::Suppressed)
            }
            Classification::Report(records) => {
                let handles = records
                    .into_iter()
                    .map(|record| {
                        debug!(
                            job_guid = %record.job_guid,
                            state = %record.state,
                            result = %record.result,
                            "contributing job"
                        );
                        metrics::jobs_contributed().add(
                            1,
                            &[
                                KeyValue::new("state", record.state.to_string()),
                                KeyValue::new("result", record.result.to_string()),
                            ],
                        );
                        self.batcher.contribute(&route.project, record)
                    })
                    .collect();
                Ok(Dispatched::Reported(handles))
            }
        }
    }

    fn dropped(&self, reason: &'static str, cause: Error) -> Dispatched {
        metrics::events_dropped().add(1, &[KeyValue::new("reason", reason)]);
        Dispatched::Dropped(cause.to_string())
    }
}

/// Per-task event lanes in front of a [`Dispatcher`].
///
/// Each task id gets a queue and a worker that handles its events one at a
/// time. A lane retires as soon as its queue runs dry, so only tasks with
/// work outstanding hold one.
pub struct EventLanes {
    dispatcher: Arc<Dispatcher>,
    state: Arc<Mutex<LaneState>>,
}

#[derive(Default)]
struct LaneState {
    queues: HashMap<String, mpsc::UnboundedSender<TaskEvent>>,
    workers: JoinSet<()>,
}

fn lock(state: &Mutex<LaneState>) -> MutexGuard<'_, LaneState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventLanes {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            state: Arc::new(Mutex::new(LaneState::default())),
        }
    }

    /// Queue `event` behind earlier events of the same task. Never waits.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, event: TaskEvent) {
        let task_id = event.task_id().to_string();
        let mut state = lock(&self.state);
        while let Some(done) = state.workers.try_join_next() {
            report_worker(done);
        }

        let event = match state.queues.get(&task_id) {
            Some(queue) => match queue.send(event) {
                Ok(()) => return,
                // the lane's worker died; open a fresh one
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (queue, events) = mpsc::unbounded_channel();
        let _ = queue.send(event);
        state.queues.insert(task_id.clone(), queue);
        state.workers.spawn(drive_lane(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.state),
            task_id,
            events,
        ));
    }

    /// Number of tasks with events queued or being handled.
    pub fn active(&self) -> usize {
        lock(&self.state).queues.len()
    }

    /// Wait until every lane has run dry.
    pub async fn drain(&self) {
        loop {
            let mut workers = std::mem::take(&mut lock(&self.state).workers);
            if workers.is_empty() {
                return;
            }
            while let Some(done) = workers.join_next().await {
                report_worker(done);
            }
        }
    }
}

async fn drive_lane(
    dispatcher: Arc<Dispatcher>,
    state: Arc<Mutex<LaneState>>,
    task_id: String,
    mut events: mpsc::UnboundedReceiver<TaskEvent>,
) {
    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(_) => {
                // Retire under the lock: a concurrent submit either landed
                // before this check or will open a new lane.
                let mut state = lock(&state);
                match events.try_recv() {
                    Ok(event) => event,
                    Err(_) => {
                        state.queues.remove(&task_id);
                        return;
                    }
                }
            }
        };
        handle_logged(&dispatcher, &event).await;
    }
}

async fn handle_logged(dispatcher: &Dispatcher, event: &TaskEvent) {
    let task_id = event.task_id();
    match dispatcher.handle(event).await {
        Ok(Dispatched::Reported(handles)) => {
            debug!(task_id, jobs = handles.len(), "event queued")
        }
        Ok(Dispatched::Suppressed) => {}
        Ok(Dispatched::Dropped(reason)) => debug!(task_id, %reason, "event dropped"),
        Err(e) => error!(task_id, error = %e, "event failed"),
    }
}

fn report_worker(done: std::result::Result<(), JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "event lane worker failed");
    }
}
