//! Lifecycle events delivered by the event source.
//!
//! The transport hands over one envelope per message. Envelopes for the same
//! task run arrive in emission order; nothing is promised across tasks.

use serde::{Deserialize, Serialize};

use crate::model::TaskStatus;

/// Which lifecycle transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Pending,
    Running,
    Completed,
    Failed,
    Exception,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Pending => "pending",
            EventKind::Running => "running",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::Exception => "exception",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub kind: EventKind,
    /// Routing keys the message was published under.
    #[serde(default)]
    pub routes: Vec<String>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub status: TaskStatus,
    /// The run this event is about.
    pub run_id: u32,
    #[serde(default)]
    pub worker_group: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        &self.payload.status.task_id
    }

    pub fn run_id(&self) -> u32 {
        self.payload.run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_envelope() {
        let line = r#"{
            "kind": "exception",
            "routes": ["treeherder.try.abc123"],
            "payload": {
                "runId": 0,
                "status": {
                    "taskId": "WzyPPh4qTG2fECo7TF1ufw",
                    "runs": [{
                        "runId": 0,
                        "state": "exception",
                        "reasonCreated": "scheduled",
                        "reasonResolved": "canceled",
                        "scheduled": "2026-03-01T12:00:00.000Z"
                    }]
                }
            }
        }"#;
        let event: TaskEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.kind, EventKind::Exception);
        assert_eq!(event.task_id(), "WzyPPh4qTG2fECo7TF1ufw");
        assert_eq!(event.payload.status.runs.len(), 1);
    }

    #[test]
    fn unknown_reasons_do_not_break_parsing() {
        let line = r#"{"runId": 2, "state": "pending", "reasonCreated": "something-new",
                       "scheduled": "2026-03-01T12:00:00Z"}"#;
        let run: crate::model::Run = serde_json::from_str(line).unwrap();
        assert_eq!(run.reason_created, crate::model::ReasonCreated::Other);
    }
}
