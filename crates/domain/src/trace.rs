use serde::Serialize;

/// Structured trace events emitted across the orchestration core.
///
/// Each variant is serialized to JSON and attached to a single `tracing`
/// event so a task or tool-run's path can be reconstructed from logs
/// without correlating free-text messages.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TaskCreated {
        task_id: String,
        project_id: String,
        input_type: String,
    },
    TaskTransition {
        task_id: String,
        from: Option<String>,
        to: String,
    },
    TaskFailed {
        task_id: String,
        from: String,
        failure_reason: String,
    },
    CollaboratorCall {
        task_id: String,
        collaborator: String,
        duration_ms: u64,
        outcome: String,
    },
    ToolRunLifecycle {
        tool_run_id: String,
        tool_name: String,
        phase: String,
    },
    ToolRunCallback {
        tool_run_id: String,
        callback_url: String,
        sent: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "orchestration_event");
    }
}
