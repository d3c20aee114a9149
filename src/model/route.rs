//! Project and revision identity resolved from an event's routes.

use serde::{Deserialize, Serialize};

/// Which project and code revision a task belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    pub project: String,
    /// Empty when the route only carries a revision hash.
    pub revision: String,
    /// Empty when the route only carries a revision.
    pub revision_hash: String,
}
