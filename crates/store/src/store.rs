//! JSON-file-backed persistent store for projects, tasks, task-status
//! history, and tool-runs.
//!
//! The specification (§4.4) describes a single-file relational database
//! operated single-writer per process. This substitutes an
//! `RwLock`-guarded in-memory map per entity, flushed to its own JSON file
//! on every mutation — the same durability shape as the teacher's
//! schedule store, applied to four related collections instead of one.
//! Single-writer discipline is preserved by holding the write lock for the
//! duration of the mutation and its flush; the foreign-key invariant
//! (every ToolRun references an existing Task) is enforced in application
//! code at the call site that creates a ToolRun.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use tr_domain::model::{InputType, Project, Task, TaskStatus, TaskStatusHistoryEntry, ToolRun};
use tr_domain::state_machine::{is_noop, validate_transition};
use tr_domain::{Error, Result};

pub struct Store {
    projects: RwLock<HashMap<Uuid, Project>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    task_history: RwLock<HashMap<Uuid, Vec<TaskStatusHistoryEntry>>>,
    tool_runs: RwLock<HashMap<Uuid, ToolRun>>,
    state_dir: PathBuf,
}

/// Whitelisted, partial update accepted by `PATCH /tasks/{id}`.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub transcript: Option<String>,
    pub refined_text: Option<String>,
    pub final_summary: Option<String>,
    pub final_audio_uri: Option<String>,
    pub raw_audio_uri: Option<String>,
    pub failure_reason: Option<String>,
}

impl Store {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        let projects = load_map(&state_dir.join("projects.json"));
        let tasks = load_map(&state_dir.join("tasks.json"));
        let task_history: HashMap<Uuid, Vec<TaskStatusHistoryEntry>> =
            load_value(&state_dir.join("task_history.json")).unwrap_or_default();
        let tool_runs = load_map(&state_dir.join("tool_runs.json"));

        tracing::info!(
            projects = projects.len(),
            tasks = tasks.len(),
            tool_runs = tool_runs.len(),
            "loaded persistent store from disk"
        );

        Self {
            projects: RwLock::new(projects),
            tasks: RwLock::new(tasks),
            task_history: RwLock::new(task_history),
            tool_runs: RwLock::new(tool_runs),
            state_dir,
        }
    }

    // ── projects ─────────────────────────────────────────────────────

    pub async fn create_project(
        &self,
        name: String,
        metadata: Option<serde_json::Value>,
    ) -> Project {
        let project = Project::new(name, metadata);
        self.projects
            .write()
            .await
            .insert(project.id, project.clone());
        self.persist_projects().await;
        project
    }

    pub async fn list_projects(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        projects
    }

    pub async fn get_project(&self, id: &Uuid) -> Option<Project> {
        self.projects.read().await.get(id).cloned()
    }

    async fn project_exists(&self, id: &Uuid) -> bool {
        self.projects.read().await.contains_key(id)
    }

    // ── tasks ────────────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        project_id: Uuid,
        input_type: InputType,
        raw_text: Option<String>,
        raw_audio_uri: Option<String>,
    ) -> Result<Task> {
        if !self.project_exists(&project_id).await {
            return Err(Error::not_found(format!("project {project_id} not found")));
        }

        let task = Task::new(project_id, input_type, raw_text, raw_audio_uri);
        let initial_entry = TaskStatusHistoryEntry::new(task.id, None, TaskStatus::Received);

        self.tasks.write().await.insert(task.id, task.clone());
        self.task_history
            .write()
            .await
            .insert(task.id, vec![initial_entry]);

        self.persist_tasks().await;
        self.persist_task_history().await;

        self.hydrate_tool_runs(task).await
    }

    /// Load the task row plus its computed `tool_runs` id list.
    pub async fn get_task(&self, id: &Uuid) -> Option<Task> {
        let task = self.tasks.read().await.get(id).cloned()?;
        Some(self.hydrate_tool_runs(task).await)
    }

    async fn hydrate_tool_runs(&self, mut task: Task) -> Task {
        let runs = self.tool_runs.read().await;
        let mut ids: Vec<Uuid> = runs
            .values()
            .filter(|r| r.task_id == task.id)
            .map(|r| r.id)
            .collect();
        ids.sort();
        task.tool_runs = ids;
        task
    }

    pub async fn get_task_history(&self, id: &Uuid) -> Vec<TaskStatusHistoryEntry> {
        let mut entries = self
            .task_history
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(|e| e.changed_at);
        entries
    }

    /// Apply a validated transition, appending a history row unless the
    /// transition is a no-op. Returns the updated task.
    pub async fn transition_task(&self, id: &Uuid, next: TaskStatus) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("task {id} not found")))?;

        validate_transition(task.status, next)?;
        let from = task.status;
        let noop = is_noop(from, next);

        task.status = next;
        task.updated_at = next_timestamp(task.updated_at);
        let snapshot = task.clone();
        drop(tasks);

        if !noop {
            let entry = TaskStatusHistoryEntry::new(*id, Some(from), next);
            self.task_history
                .write()
                .await
                .entry(*id)
                .or_default()
                .push(entry);
            self.persist_task_history().await;
        }
        self.persist_tasks().await;

        Ok(self.hydrate_tool_runs(snapshot).await)
    }

    /// Fail a task, truncating `failure_reason` to the 500-char limit
    /// (§3 invariant 6, P3). A task already `FAILED` is left untouched.
    pub async fn fail_task(&self, id: &Uuid, failure_reason: &str) -> Result<Task> {
        {
            let tasks = self.tasks.read().await;
            if let Some(task) = tasks.get(id) {
                if task.status == TaskStatus::Failed {
                    return Ok(self.hydrate_tool_runs(task.clone()).await);
                }
            }
        }
        let truncated: String = failure_reason
            .chars()
            .take(tr_domain::model::FAILURE_REASON_MAX_CHARS)
            .collect();

        let task = self.transition_task(id, TaskStatus::Failed).await?;
        self.apply_patch(
            id,
            TaskPatch {
                failure_reason: Some(truncated),
                ..TaskPatch::default()
            },
        )
        .await?;
        let _ = task;
        self.get_task(id)
            .await
            .ok_or_else(|| Error::not_found(format!("task {id} not found")))
    }

    /// Apply a whitelisted partial update. Handles `status` through the
    /// same transition validator the HTTP layer and the dispatcher share.
    pub async fn apply_patch(&self, id: &Uuid, patch: TaskPatch) -> Result<Task> {
        if let Some(next) = patch.status {
            self.transition_task(id, next).await?;
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("task {id} not found")))?;

        let mut changed = false;
        if let Some(v) = patch.transcript {
            task.transcript = Some(v);
            changed = true;
        }
        if let Some(v) = patch.refined_text {
            task.refined_text = Some(v);
            changed = true;
        }
        if let Some(v) = patch.final_summary {
            task.final_summary = Some(v);
            changed = true;
        }
        if let Some(v) = patch.final_audio_uri {
            task.final_audio_uri = Some(v);
            changed = true;
        }
        if let Some(v) = patch.raw_audio_uri {
            task.raw_audio_uri = Some(v);
            changed = true;
        }
        if let Some(v) = patch.failure_reason {
            let truncated: String = v
                .chars()
                .take(tr_domain::model::FAILURE_REASON_MAX_CHARS)
                .collect();
            task.failure_reason = Some(truncated);
            changed = true;
        }
        if changed {
            task.updated_at = next_timestamp(task.updated_at);
        }
        let snapshot = task.clone();
        drop(tasks);

        if changed {
            self.persist_tasks().await;
        }
        Ok(self.hydrate_tool_runs(snapshot).await)
    }

    /// Every task whose status is not terminal — used by the dispatcher's
    /// startup recovery sweep (§10.5).
    pub async fn non_terminal_task_ids(&self) -> Vec<Uuid> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id)
            .collect()
    }

    // ── tool runs ────────────────────────────────────────────────────

    /// Create a plain ToolRun record (the Tracker's own `POST /tool-runs`,
    /// or the Supervisor registering a freshly-created async run).
    pub async fn create_tool_run(&self, mut run: ToolRun) -> Result<ToolRun> {
        if self.tasks.read().await.get(&run.task_id).is_none() {
            return Err(Error::not_found(format!("task {} not found", run.task_id)));
        }
        run.updated_at = Utc::now();
        self.tool_runs.write().await.insert(run.id, run.clone());
        self.persist_tool_runs().await;
        Ok(run)
    }

    pub async fn get_tool_run(&self, id: &Uuid) -> Option<ToolRun> {
        self.tool_runs.read().await.get(id).cloned()
    }

    /// Mutate a tool-run in place and persist. Used by the supervisor
    /// worker to record phase transitions (RUNNING, SUCCEEDED/FAILED,
    /// artifacts, markers, callback_sent).
    pub async fn update_tool_run(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut ToolRun),
    ) -> Option<ToolRun> {
        let mut runs = self.tool_runs.write().await;
        let run = runs.get_mut(id)?;
        f(run);
        run.updated_at = next_timestamp(run.updated_at);
        let snapshot = run.clone();
        drop(runs);
        self.persist_tool_runs().await;
        Some(snapshot)
    }

    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    // ── persistence ──────────────────────────────────────────────────

    async fn persist_projects(&self) {
        let snapshot: Vec<Project> = self.projects.read().await.values().cloned().collect();
        persist(self.state_dir.join("projects.json"), snapshot).await;
    }

    async fn persist_tasks(&self) {
        let snapshot: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        persist(self.state_dir.join("tasks.json"), snapshot).await;
    }

    async fn persist_task_history(&self) {
        let snapshot = self.task_history.read().await.clone();
        persist(self.state_dir.join("task_history.json"), snapshot).await;
    }

    async fn persist_tool_runs(&self) {
        let snapshot: Vec<ToolRun> = self.tool_runs.read().await.values().cloned().collect();
        persist(self.state_dir.join("tool_runs.json"), snapshot).await;
    }
}

/// `updated_at` must strictly advance (invariant 3 / P6). `Utc::now()` can
/// tie with the previous value under fast successive mutations (tests in
/// particular), so this guarantees forward progress regardless of wall
/// clock resolution.
fn next_timestamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + chrono::Duration::microseconds(1)
    }
}

async fn persist<T: serde::Serialize + Send + 'static>(path: PathBuf, value: T) {
    let _ = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&value)?;
        std::fs::write(&path, json)
    })
    .await
    .map_err(|e| tracing::warn!(error = %e, "persist task panicked"))
    .and_then(|res| {
        if let Err(e) = res {
            tracing::warn!(error = %e, "failed to persist store collection");
        }
        Ok::<(), ()>(())
    });
}

fn load_map<T>(path: &std::path::Path) -> HashMap<Uuid, T>
where
    T: serde::de::DeserializeOwned + HasId,
{
    let rows: Vec<T> = load_value(path).unwrap_or_default();
    rows.into_iter().map(|row| (row.id(), row)).collect()
}

fn load_value<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

trait HasId {
    fn id(&self) -> Uuid;
}

impl HasId for Project {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for Task {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl HasId for ToolRun {
    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tr_domain::model::ToolRunStatus as TRS;

    fn new_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Store::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn create_task_requires_existing_project() {
        let (store, _dir) = new_store();
        let err = store
            .create_task(Uuid::new_v4(), InputType::Text, Some("hi".into()), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_task_seeds_initial_history_row() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();

        let history = store.get_task_history(&task.id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, TaskStatus::Received);
    }

    #[tokio::test]
    async fn transition_appends_history_and_bumps_updated_at() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();
        let before = task.updated_at;

        let updated = store
            .transition_task(&task.id, TaskStatus::Routed)
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Routed);
        assert!(updated.updated_at >= before);

        let history = store.get_task_history(&task.id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from_status, Some(TaskStatus::Received));
        assert_eq!(history[1].to_status, TaskStatus::Routed);
    }

    #[tokio::test]
    async fn noop_transition_does_not_append_history() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();

        store
            .transition_task(&task.id, TaskStatus::Received)
            .await
            .unwrap();
        let history = store.get_task_history(&task.id).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected_and_leaves_row_unchanged() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::Routed)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::Refining)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::ToolQueued)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::ToolRunning)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::Summarizing)
            .await
            .unwrap();
        store
            .transition_task(&task.id, TaskStatus::Delivered)
            .await
            .unwrap();

        let err = store
            .transition_task(&task.id, TaskStatus::Refining)
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let current = store.get_task(&task.id).await.unwrap();
        assert_eq!(current.status, TaskStatus::Delivered);
    }

    #[tokio::test]
    async fn fail_task_truncates_failure_reason() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();

        let long_reason = "x".repeat(600);
        let failed = store.fail_task(&task.id, &long_reason).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.failure_reason.unwrap().chars().count(),
            tr_domain::model::FAILURE_REASON_MAX_CHARS
        );
    }

    #[tokio::test]
    async fn fail_task_is_idempotent_once_failed() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();
        store.fail_task(&task.id, "boom").await.unwrap();
        let second = store.fail_task(&task.id, "boom again").await.unwrap();
        assert_eq!(second.failure_reason.unwrap(), "boom");
    }

    #[tokio::test]
    async fn create_tool_run_requires_existing_task() {
        let (store, _dir) = new_store();
        let run = ToolRun::new_record(
            Uuid::new_v4(),
            "dummy".into(),
            TRS::Queued,
            None,
            None,
            None,
            None,
        );
        let err = store.create_tool_run(run).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn task_view_includes_its_tool_runs() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let task = store
            .create_task(project.id, InputType::Text, Some("hi".into()), None)
            .await
            .unwrap();
        let run = ToolRun::new_record(task.id, "dummy".into(), TRS::Queued, None, None, None, None);
        let run = store.create_tool_run(run).await.unwrap();

        let reloaded = store.get_task(&task.id).await.unwrap();
        assert_eq!(reloaded.tool_runs, vec![run.id]);
    }

    #[tokio::test]
    async fn non_terminal_task_ids_excludes_delivered_and_failed() {
        let (store, _dir) = new_store();
        let project = store.create_project("P".into(), None).await;
        let pending = store
            .create_task(project.id, InputType::Text, Some("a".into()), None)
            .await
            .unwrap();
        let delivered = store
            .create_task(project.id, InputType::Text, Some("b".into()), None)
            .await
            .unwrap();
        for next in [
            TaskStatus::Routed,
            TaskStatus::Refining,
            TaskStatus::ToolQueued,
            TaskStatus::ToolRunning,
            TaskStatus::Summarizing,
            TaskStatus::Delivered,
        ] {
            store.transition_task(&delivered.id, next).await.unwrap();
        }

        let ids = store.non_terminal_task_ids().await;
        assert!(ids.contains(&pending.id));
        assert!(!ids.contains(&delivered.id));
    }

    #[tokio::test]
    async fn store_reloads_persisted_state_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let project_id;
        let task_id;
        {
            let store = Store::new(dir.path());
            let project = store.create_project("P".into(), None).await;
            project_id = project.id;
            let task = store
                .create_task(project.id, InputType::Text, Some("hi".into()), None)
                .await
                .unwrap();
            task_id = task.id;
        }

        let reopened = Store::new(dir.path());
        assert!(reopened.get_project(&project_id).await.is_some());
        assert!(reopened.get_task(&task_id).await.is_some());
    }
}
