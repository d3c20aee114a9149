//! Core data model.
//!
//! Upstream, a task has one or more runs and each run moves through a
//! lifecycle. Downstream, the dashboard only knows about jobs: one job per
//! (task, run) pair, carrying a state and a result.

pub mod job;
pub mod route;
pub mod task;

pub use job::*;
pub use route::RouteInfo;
pub use task::*;
