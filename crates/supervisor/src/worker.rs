//! Background lifecycle for a single supervised tool run:
//! `QUEUED -> RUNNING -> SUCCEEDED | FAILED`, with artifact files and a
//! best-effort completion callback.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use tr_domain::model::ToolRunStatus;
use tr_domain::trace::TraceEvent;

use crate::adapter::Command;
use crate::registry::{SupervisedToolRun, Supervisor};

fn emit_lifecycle(registry: &Arc<Supervisor>, id: uuid::Uuid, phase: &str) {
    let Some(run) = registry.get(&id) else { return };
    TraceEvent::ToolRunLifecycle {
        tool_run_id: id.to_string(),
        tool_name: run.tool_name,
        phase: phase.to_string(),
    }
    .emit();
}

pub(crate) async fn fail_startup(registry: &Arc<Supervisor>, id: uuid::Uuid, message: String) {
    let dir = registry.get(&id).map(|r| r.artifacts_dir.clone());
    if let Some(dir) = dir {
        if tokio::fs::create_dir_all(&dir).await.is_ok() {
            let _ = tokio::fs::write(dir.join("stdout.log"), b"").await;
            let _ = tokio::fs::write(dir.join("stderr.log"), message.as_bytes()).await;
        }
    }

    let now = Utc::now();
    registry.update(&id, |run| {
        run.status = ToolRunStatus::Failed;
        run.exit_code = Some(-1);
        run.startup_error = Some(message);
        run.finished_at = Some(now);
        run.artifacts = vec!["stdout.log".into(), "stderr.log".into()];
    });

    fire_callback(registry, id).await;
}

pub(crate) async fn spawn_and_monitor(registry: &Arc<Supervisor>, id: uuid::Uuid, command: Command) {
    let Some(dir) = registry.get(&id).map(|r| r.artifacts_dir.clone()) else {
        return;
    };
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        registry.update(&id, |run| {
            run.status = ToolRunStatus::Failed;
            run.exit_code = Some(-1);
            run.startup_error = Some(format!("failed to create artifacts dir: {e}"));
            run.finished_at = Some(Utc::now());
        });
        fire_callback(registry, id).await;
        return;
    }

    registry.update(&id, |run| {
        run.status = ToolRunStatus::Running;
        run.started_at = Some(Utc::now());
    });
    emit_lifecycle(registry, id, "RUNNING");

    let mut cmd = TokioCommand::new(&command.program);
    cmd.args(&command.args);
    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &command.envs {
        cmd.env(k, v);
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    if let Err(message) = crate::privdrop::apply(&mut cmd, &registry.cfg) {
        registry.update(&id, |run| {
            run.status = ToolRunStatus::Failed;
            run.exit_code = Some(-1);
            run.startup_error = Some(message);
            run.finished_at = Some(Utc::now());
        });
        fire_callback(registry, id).await;
        return;
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tokio::fs::write(dir.join("stdout.log"), b"").await;
            let _ = tokio::fs::write(dir.join("stderr.log"), e.to_string()).await;
            registry.update(&id, |run| {
                run.status = ToolRunStatus::Failed;
                run.exit_code = Some(-1);
                run.startup_error = Some(format!("failed to spawn: {e}"));
                run.finished_at = Some(Utc::now());
                run.artifacts = vec!["stdout.log".into(), "stderr.log".into()];
            });
            fire_callback(registry, id).await;
            return;
        }
    };

    registry.update(&id, |run| run.pid = child.id());

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let exit_status = child.wait().await;
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    let _ = tokio::fs::write(dir.join("stdout.log"), &stdout).await;
    let _ = tokio::fs::write(dir.join("stderr.log"), &stderr).await;

    let (branch, commit_hash) = extract_markers(&stdout);
    let mut artifacts = vec!["stdout.log".to_string(), "stderr.log".to_string()];
    if let Some(branch) = &branch {
        artifacts.push(format!("branch:{branch}"));
    }
    if let Some(commit_hash) = &commit_hash {
        artifacts.push(format!("commit_hash:{commit_hash}"));
    }

    let exit_code = exit_status.ok().and_then(|s| s.code()).unwrap_or(-1);
    let status = if exit_code == 0 {
        ToolRunStatus::Succeeded
    } else {
        ToolRunStatus::Failed
    };

    registry.update(&id, |run| {
        run.status = status;
        run.exit_code = Some(exit_code);
        run.branch = branch;
        run.commit_hash = commit_hash;
        run.artifacts = artifacts;
        run.finished_at = Some(Utc::now());
    });
    emit_lifecycle(registry, id, if exit_code == 0 { "SUCCEEDED" } else { "FAILED" });

    fire_callback(registry, id).await;
}

fn extract_markers(stdout: &str) -> (Option<String>, Option<String>) {
    let mut branch = None;
    let mut commit_hash = None;
    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("__BRANCH__=") {
            branch = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("__COMMIT_HASH__=") {
            commit_hash = Some(value.trim().to_string());
        }
    }
    (branch, commit_hash)
}

async fn fire_callback(registry: &Arc<Supervisor>, id: uuid::Uuid) {
    let Some(run) = registry.get(&id) else { return };
    let Some(url) = run.callback_url.clone() else {
        return;
    };
    if run.callback_sent {
        return;
    }

    let body = serde_json::json!({
        "tool_run_id": run.id,
        "status": run.status,
        "exit_code": run.exit_code,
        "artifacts": run.artifacts,
        "branch": run.branch,
        "commit_hash": run.commit_hash,
    });

    let sent = match registry.http.post(&url).json(&body).send().await {
        Ok(resp) if resp.status().is_success() => {
            registry.update(&id, |run| run.callback_sent = true);
            true
        }
        Ok(resp) => {
            tracing::warn!(tool_run_id = %id, status = %resp.status(), "tool run callback rejected");
            false
        }
        Err(e) => {
            tracing::warn!(tool_run_id = %id, error = %e, "tool run callback failed");
            false
        }
    };
    TraceEvent::ToolRunCallback {
        tool_run_id: id.to_string(),
        callback_url: url,
        sent,
    }
    .emit();
}

/// Read the last `n` lines of a file, or `""` if it doesn't exist yet.
pub fn tail_lines(path: &Path, n: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

impl SupervisedToolRun {
    pub fn stdout_tail(&self, n: usize) -> String {
        tail_lines(&self.stdout_path(), n)
    }

    pub fn stderr_tail(&self, n: usize) -> String {
        tail_lines(&self.stderr_path(), n)
    }
}
