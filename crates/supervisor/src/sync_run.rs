//! The synchronous `/tooler/run` path: run a tool to completion inline
//! and return its result in the same request, instead of going through
//! the async `QUEUED -> RUNNING -> ...` tool-run lifecycle.

use std::process::Stdio;

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use tr_domain::config::SupervisorConfig;
use tr_domain::Result;

use crate::adapter::{self, Outcome};

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunResult {
    pub tool: String,
    pub exit_code: i32,
    pub result_text: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

/// Eagerly-rejected inputs (unknown tool, missing required field) still
/// surface as `Err` here — the caller maps those to `400`. Every other
/// precondition failure comes back as a normal `SyncRunResult` with
/// `exit_code == -1`, matching the async path's `startup_error` framing.
pub async fn run(tool_name: &str, input: Value, cfg: &SupervisorConfig) -> Result<SyncRunResult> {
    match adapter::resolve(tool_name, &input, cfg)? {
        Outcome::StartupError(message) => Ok(SyncRunResult {
            tool: tool_name.to_string(),
            exit_code: -1,
            result_text: String::new(),
            stderr: message,
            branch: None,
            commit_hash: None,
        }),
        Outcome::Command(command) => {
            let mut cmd = TokioCommand::new(&command.program);
            cmd.args(&command.args);
            if let Some(cwd) = &command.cwd {
                cmd.current_dir(cwd);
            }
            for (k, v) in &command.envs {
                cmd.env(k, v);
            }
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

            if let Err(message) = crate::privdrop::apply(&mut cmd, cfg) {
                return Ok(SyncRunResult {
                    tool: tool_name.to_string(),
                    exit_code: -1,
                    result_text: String::new(),
                    stderr: message,
                    branch: None,
                    commit_hash: None,
                });
            }

            let mut child = cmd.spawn().map_err(|e| {
                tr_domain::Error::upstream("tooler", format!("failed to spawn {tool_name}: {e}"))
            })?;

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

            let status = child.wait().await.map_err(|e| {
                tr_domain::Error::upstream("tooler", format!("{tool_name} wait failed: {e}"))
            })?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();

            let mut branch = None;
            let mut commit_hash = None;
            for line in stdout.lines() {
                if let Some(v) = line.strip_prefix("__BRANCH__=") {
                    branch = Some(v.trim().to_string());
                } else if let Some(v) = line.strip_prefix("__COMMIT_HASH__=") {
                    commit_hash = Some(v.trim().to_string());
                }
            }

            Ok(SyncRunResult {
                tool: tool_name.to_string(),
                exit_code: status.code().unwrap_or(-1),
                result_text: stdout,
                stderr,
                branch,
                commit_hash,
            })
        }
    }
}
