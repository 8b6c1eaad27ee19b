//! The supervisor's own tool-run registry.
//!
//! This is deliberately a separate type from `tr_domain::model::ToolRun`:
//! a tool run here is not tied to a task (`POST /tool-runs` takes no
//! `task_id`) and is never persisted across a restart — the "retry
//! across process restarts" behaviour is explicitly out of scope, so an
//! in-memory map is enough.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use tr_domain::config::SupervisorConfig;
use tr_domain::model::ToolRunStatus;
use tr_domain::{Error, Result};

use crate::adapter::{self, Outcome};
use crate::worker;

#[derive(Debug, Clone)]
pub struct SupervisedToolRun {
    pub id: Uuid,
    pub tool_name: String,
    pub status: ToolRunStatus,
    pub input: Value,
    pub artifacts_dir: PathBuf,
    pub artifacts: Vec<String>,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub callback_url: Option<String>,
    pub callback_sent: bool,
    pub startup_error: Option<String>,
    pub branch: Option<String>,
    pub commit_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SupervisedToolRun {
    pub fn stdout_path(&self) -> PathBuf {
        self.artifacts_dir.join("stdout.log")
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.artifacts_dir.join("stderr.log")
    }
}

pub struct Supervisor {
    runs: RwLock<HashMap<Uuid, SupervisedToolRun>>,
    pub(crate) cfg: SupervisorConfig,
    pub(crate) http: reqwest::Client,
}

impl Supervisor {
    pub fn new(cfg: SupervisorConfig) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Arc::new(Self {
            runs: RwLock::new(HashMap::new()),
            cfg,
            http,
        })
    }

    /// Create and launch a tool run. Rejects eagerly (no row created) for
    /// an unknown tool or a missing required field; anything an adapter
    /// can only discover once committed (missing binary, bad workdir)
    /// comes back as a row that is already `FAILED`.
    ///
    /// Pauses briefly after launch so the spawned process has a chance to
    /// report its `pid` before the `201` response is built.
    pub async fn create(
        self: &Arc<Self>,
        tool_name: &str,
        input: Value,
        callback_url: Option<String>,
    ) -> Result<SupervisedToolRun> {
        let outcome = adapter::resolve(tool_name, &input, &self.cfg)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let artifacts_dir = PathBuf::from(&self.cfg.artifacts_dir).join(id.to_string());

        let run = SupervisedToolRun {
            id,
            tool_name: tool_name.to_string(),
            status: ToolRunStatus::Queued,
            input,
            artifacts_dir,
            artifacts: Vec::new(),
            pid: None,
            exit_code: None,
            callback_url,
            callback_sent: false,
            startup_error: None,
            branch: None,
            commit_hash: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        self.runs.write().insert(id, run.clone());

        match outcome {
            Outcome::StartupError(message) => {
                let registry = Arc::clone(self);
                tokio::spawn(async move { worker::fail_startup(&registry, id, message).await });
            }
            Outcome::Command(command) => {
                let registry = Arc::clone(self);
                tokio::spawn(async move { worker::spawn_and_monitor(&registry, id, command).await });
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }

        Ok(self.get(&id).expect("row was just inserted"))
    }

    pub fn get(&self, id: &Uuid) -> Option<SupervisedToolRun> {
        self.runs.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<SupervisedToolRun> {
        let mut runs: Vec<_> = self.runs.read().values().cloned().collect();
        runs.sort_by_key(|r| r.created_at);
        runs
    }

    pub(crate) fn update(&self, id: &Uuid, f: impl FnOnce(&mut SupervisedToolRun)) {
        if let Some(run) = self.runs.write().get_mut(id) {
            f(run);
            run.updated_at = Utc::now();
        }
    }

    pub fn not_found(id: &Uuid) -> Error {
        Error::not_found(format!("tool run {id} not found"))
    }
}
