//! Span helpers for events moving through the relay.

use tracing::Span;

/// Start a span covering the handling of one lifecycle event.
///
/// `relay.project` and `relay.outcome` are declared empty; fill them with
/// [`record_project`] and [`record_outcome`].
pub fn start_event_span(kind: &str, task_id: &str, run_id: u32) -> Span {
    tracing::info_span!(
        "relay.event",
        "relay.kind" = kind,
        "task.id" = task_id,
        "run.id" = run_id,
        "relay.project" = tracing::field::Empty,
        "relay.outcome" = tracing::field::Empty,
    )
}

pub fn record_project(span: &Span, project: &str) {
    span.record("relay.project", project);
}

/// Record how the event ended ("reported", "suppressed", "dropped", ...).
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("relay.outcome", outcome);
}

/// Start a span for one batch flush.
pub fn start_flush_span(project: &str, jobs: usize) -> Span {
    tracing::info_span!("relay.flush", "relay.project" = project, "relay.jobs" = jobs)
}
