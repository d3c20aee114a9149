//! Metric instrument factories for jobrelay.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("jobrelay")
}

/// Counter: lifecycle events received.
/// Labels: `kind`.
pub fn events_received() -> Counter<u64> {
    meter()
        .u64_counter("jobrelay.events.received")
        .with_description("Lifecycle events received from the event source")
        .build()
}

/// Counter: events dropped before classification.
/// Labels: `reason` ("route" | "unknown_project" | "missing_run" | "fetch" | "invalid").
pub fn events_dropped() -> Counter<u64> {
    meter()
        .u64_counter("jobrelay.events.dropped")
        .with_description("Events dropped without producing jobs")
        .build()
}

/// Counter: events the classifier chose not to report.
/// Labels: `kind`, `reason`.
pub fn events_suppressed() -> Counter<u64> {
    meter()
        .u64_counter("jobrelay.events.suppressed")
        .with_description("Events suppressed by the lifecycle classifier")
        .build()
}

/// Counter: job records handed to the batcher.
/// Labels: `state`, `result`.
pub fn jobs_contributed() -> Counter<u64> {
    meter()
        .u64_counter("jobrelay.jobs.contributed")
        .with_description("Job records queued for reporting")
        .build()
}

/// Counter: batch flushes.
/// Labels: `result` ("ok" | "error" | "timeout").
pub fn batches_flushed() -> Counter<u64> {
    meter()
        .u64_counter("jobrelay.batches.flushed")
        .with_description("Job batches submitted to the reporting service")
        .build()
}

/// Histogram: flush duration in milliseconds.
pub fn flush_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("jobrelay.flush.duration_ms")
        .with_description("Time spent submitting one job batch")
        .with_unit("ms")
        .build()
}
