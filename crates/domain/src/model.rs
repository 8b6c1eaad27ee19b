//! Core data model: `Project`, `Task`, `TaskStatusHistory`, `ToolRun`.
//!
//! These are the row shapes persisted by the store (`tr-store`) and
//! returned verbatim, or close to it, by the Tracker's HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The ten states a [`Task`] may occupy. See `state_machine` for the
/// transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Received,
    Routed,
    Transcribing,
    Refining,
    ToolQueued,
    ToolRunning,
    Summarizing,
    TtsGenerating,
    Delivered,
    Failed,
}

impl TaskStatus {
    /// `DELIVERED` and `FAILED` admit no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Delivered | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolRunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, metadata: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub input_type: InputType,
    pub raw_text: Option<String>,
    pub raw_audio_uri: Option<String>,
    pub transcript: Option<String>,
    pub refined_text: Option<String>,
    pub status: TaskStatus,
    pub tool_runs: Vec<Uuid>,
    pub final_summary: Option<String>,
    pub final_audio_uri: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum length of `Task.failure_reason`, per invariant 6 and P3.
pub const FAILURE_REASON_MAX_CHARS: usize = 500;

impl Task {
    pub fn new(
        project_id: Uuid,
        input_type: InputType,
        raw_text: Option<String>,
        raw_audio_uri: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            input_type,
            raw_text,
            raw_audio_uri,
            transcript: None,
            refined_text: None,
            status: TaskStatus::Received,
            tool_runs: Vec::new(),
            final_summary: None,
            final_audio_uri: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusHistoryEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub from_status: Option<TaskStatus>,
    pub to_status: TaskStatus,
    pub changed_at: DateTime<Utc>,
}

impl TaskStatusHistoryEntry {
    pub fn new(task_id: Uuid, from_status: Option<TaskStatus>, to_status: TaskStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            from_status,
            to_status,
            changed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRun {
    pub id: Uuid,
    pub task_id: Uuid,
    pub tool_name: String,
    pub status: ToolRunStatus,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Supervisor-owned, non-persisted-by-the-Tracker fields. The Tracker's
    /// own `POST /tool-runs` never populates these; the Supervisor's
    /// in-memory registry is the source of truth for a live run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub callback_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

impl ToolRun {
    /// A row created by the Tracker's own `POST /tool-runs` (a plain
    /// record, not a live supervised run).
    pub fn new_record(
        task_id: Uuid,
        tool_name: String,
        status: ToolRunStatus,
        input: Option<serde_json::Value>,
        output: Option<serde_json::Value>,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_id,
            tool_name,
            status,
            input,
            output,
            started_at,
            finished_at,
            created_at: now,
            updated_at: now,
            stdout_path: None,
            stderr_path: None,
            artifacts: Vec::new(),
            pid: None,
            exit_code: None,
            callback_url: None,
            callback_sent: false,
            startup_error: None,
            branch: None,
            commit_hash: None,
        }
    }
}
