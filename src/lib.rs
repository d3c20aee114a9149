//! # jobrelay
//!
//! Relays task-run lifecycle events to a job reporting dashboard.
//!
//! Each event is classified ([`classify`]), normalized into a validated job
//! record ([`normalize`]) and queued per project; a background tick flushes
//! each project's queue as one batch ([`batch`]). The task service and the
//! reporting service sit behind the [`source::TaskSource`] and
//! [`sink::ReportSink`] traits.

pub mod batch;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod normalize;
pub mod projects;
pub mod route;
pub mod sink;
pub mod source;
pub mod telemetry;
