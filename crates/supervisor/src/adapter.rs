//! Tool adapters — pure functions `(tool_name, input) -> Outcome`.
//!
//! Each adapter either resolves to a `Command` argv ready to spawn, or to
//! a `StartupError` that short-circuits the worker before anything is
//! spawned. Unknown tool names and missing required fields are rejected
//! eagerly as `BadRequest`, before a run_id is even allocated.

use std::path::Path;

use serde_json::Value;

use tr_domain::config::SupervisorConfig;
use tr_domain::{Error, Result};

pub const ALLOWED_TOOLS: &[&str] = &["dummy", "codex", "git-autocommit"];

/// A resolved subprocess invocation.
#[derive(Debug, Clone)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub envs: Vec<(String, String)>,
}

/// What an adapter produced for a given input.
#[derive(Debug, Clone)]
pub enum Outcome {
    Command(Command),
    StartupError(String),
}

/// Resolve `tool_name` against its adapter. Returns `Err` for inputs that
/// are rejected outright (unknown tool, missing required field) — these
/// never reach tool-run creation. A precondition an adapter can only
/// detect once it has committed to running (missing binary, absent
/// credential, non-repo workdir) is reported as `Outcome::StartupError`
/// instead, so the caller still gets a `201`-style tool-run that then
/// fails asynchronously.
pub fn resolve(tool_name: &str, input: &Value, cfg: &SupervisorConfig) -> Result<Outcome> {
    match tool_name {
        "dummy" => Ok(dummy(input)),
        "codex" => codex(input, cfg),
        "git-autocommit" => Ok(git_autocommit(input)),
        other => Err(Error::validation(format!(
            "tool '{other}' is not allowed (allowed: {})",
            ALLOWED_TOOLS.join(", ")
        ))),
    }
}

fn str_field<'a>(input: &'a Value, name: &str) -> Option<&'a str> {
    input.get(name).and_then(|v| v.as_str())
}

fn bool_field(input: &Value, name: &str, default: bool) -> bool {
    input.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
}

// ── dummy ────────────────────────────────────────────────────────────

fn dummy(input: &Value) -> Outcome {
    // The pipeline dispatcher's inline tool call (§4.2 step 7) posts
    // `{text: refined_text}`; a direct `POST /tool-runs` client posts
    // `{message: ...}`. Accept either.
    let message = str_field(input, "message")
        .or_else(|| str_field(input, "text"))
        .unwrap_or("")
        .to_string();
    let sleep_seconds = input
        .get("sleep_seconds")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 30.0);

    // $1/$2 are passed as argv, not interpolated into the script text, so
    // an arbitrary `message` can't break out of the printf call.
    let script = r#"printf 'start: %s\n' "$1"; sleep "$2"; printf 'done\n'"#;
    Outcome::Command(Command {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            script.into(),
            "--".into(),
            message,
            sleep_seconds.to_string(),
        ],
        cwd: None,
        envs: Vec::new(),
    })
}

// ── codex ────────────────────────────────────────────────────────────

fn codex(input: &Value, cfg: &SupervisorConfig) -> Result<Outcome> {
    let prompt = str_field(input, "prompt").unwrap_or("");
    if prompt.trim().is_empty() {
        return Err(Error::validation("input.prompt is required"));
    }

    if cfg.codex.mock {
        return Ok(Outcome::Command(Command {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"printf '%s\n' "$1""#.into(),
                "--".into(),
                format!("mock codex response for: {prompt}"),
            ],
            cwd: None,
            envs: Vec::new(),
        }));
    }

    let workdir = str_field(input, "workdir");
    let skip_git_repo_check = bool_field(input, "skip_git_repo_check", false);

    if let Some(workdir) = workdir {
        if !Path::new(workdir).is_dir() {
            return Ok(Outcome::StartupError(format!(
                "workdir '{workdir}' is not an existing directory"
            )));
        }
        if !skip_git_repo_check && !Path::new(workdir).join(".git").exists() {
            return Ok(Outcome::StartupError(format!(
                "workdir '{workdir}' is not a git repository"
            )));
        }
    }

    if !binary_resolvable("codex") {
        return Ok(Outcome::StartupError(
            "codex binary not found on PATH: codex is not configured".into(),
        ));
    }
    if !credential_present(cfg) {
        return Ok(Outcome::StartupError(format!(
            "no codex credential under {}: codex is not configured",
            cfg.codex.home_dir
        )));
    }

    let mode = str_field(input, "mode").unwrap_or("readonly");
    let approval_policy = str_field(input, "approval_policy").unwrap_or("never");
    let json_output = bool_field(input, "json_output", false);

    let mut args = vec![
        "exec".to_string(),
        format!("--sandbox={mode}"),
        format!("--ask-for-approval={approval_policy}"),
    ];
    if let Some(model) = str_field(input, "model") {
        args.push("--model".into());
        args.push(model.to_string());
    }
    if json_output {
        args.push("--json".into());
    }
    args.push(prompt.to_string());

    Ok(Outcome::Command(Command {
        program: "codex".into(),
        args,
        cwd: workdir.map(str::to_string),
        envs: Vec::new(),
    }))
}

fn binary_resolvable(name: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(name).is_file())
}

fn credential_present(cfg: &SupervisorConfig) -> bool {
    if let Ok(key) = std::env::var("CODEX_API_KEY") {
        if !key.is_empty() {
            return true;
        }
    }
    let home = shellexpand_home(&cfg.codex.home_dir);
    Path::new(&home).join("auth.json").exists()
}

fn shellexpand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    path.to_string()
}

// ── git-autocommit ───────────────────────────────────────────────────

fn git_autocommit(input: &Value) -> Outcome {
    let Some(workdir) = str_field(input, "workdir") else {
        return Outcome::StartupError("input.workdir is required".into());
    };
    if !Path::new(workdir).is_dir() || !Path::new(workdir).join(".git").exists() {
        return Outcome::StartupError(format!("workdir '{workdir}' is not a git repository"));
    }

    let subject = str_field(input, "subject")
        .unwrap_or("autobot: automated update")
        .to_string();
    let branch = format!("autobot/{}", today());
    let push = bool_field(input, "push", false)
        || std::env::var("GIT_PUSH")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

    let script = r#"
set -e
git checkout -B "$1"
git add -A
if ! git diff --cached --quiet; then
  git commit -m "$2"
fi
commit_hash="$(git rev-parse HEAD)"
printf '__BRANCH__=%s\n' "$1"
printf '__COMMIT_HASH__=%s\n' "$commit_hash"
if [ "$3" = "1" ]; then
  git push -u origin "$1"
fi
"#;

    Outcome::Command(Command {
        program: "sh".into(),
        args: vec![
            "-c".into(),
            script.into(),
            "--".into(),
            branch,
            subject,
            if push { "1".into() } else { "0".into() },
        ],
        cwd: Some(workdir.to_string()),
        envs: Vec::new(),
    })
}

/// Today's date as `YYYY-MM-DD`, used for the `autobot/YYYY-MM-DD` branch
/// name. Not a pure function of its arguments (reads the system clock),
/// kept isolated here so the rest of the adapter stays testable.
fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg() -> SupervisorConfig {
        SupervisorConfig::default()
    }

    #[test]
    fn unknown_tool_is_rejected_with_allowed_list() {
        let err = resolve("rm-rf", &json!({}), &cfg()).unwrap_err();
        assert!(err.is_validation());
        let msg = err.to_string();
        assert!(msg.contains("not allowed"));
        assert!(msg.contains("dummy"));
    }

    #[test]
    fn dummy_builds_safe_argv_with_message_as_positional() {
        let outcome = resolve(
            "dummy",
            &json!({"message": "hi; rm -rf /", "sleep_seconds": 0.1}),
            &cfg(),
        )
        .unwrap();
        match outcome {
            Outcome::Command(cmd) => {
                assert_eq!(cmd.program, "sh");
                assert!(cmd.args.contains(&"hi; rm -rf /".to_string()));
            }
            Outcome::StartupError(e) => panic!("unexpected startup error: {e}"),
        }
    }

    #[test]
    fn dummy_clamps_sleep_seconds() {
        let outcome = resolve("dummy", &json!({"sleep_seconds": 999}), &cfg()).unwrap();
        match outcome {
            Outcome::Command(cmd) => assert!(cmd.args.contains(&"30".to_string())),
            Outcome::StartupError(e) => panic!("unexpected startup error: {e}"),
        }
    }

    #[test]
    fn codex_requires_prompt() {
        let err = resolve("codex", &json!({}), &cfg()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("input.prompt"));
    }

    #[test]
    fn codex_without_credential_is_startup_error() {
        // SAFETY: test-process-local env var manipulation, no concurrent
        // access to this var within the test binary's test harness.
        std::env::remove_var("CODEX_API_KEY");
        let mut c = cfg();
        c.codex.home_dir = "/nonexistent-codex-home".into();
        let outcome = resolve("codex", &json!({"prompt": "hi"}), &c).unwrap();
        match outcome {
            Outcome::StartupError(msg) => assert!(msg.contains("not configured")),
            Outcome::Command(_) => panic!("expected a startup error"),
        }
    }

    #[test]
    fn codex_mock_mode_short_circuits() {
        let mut c = cfg();
        c.codex.mock = true;
        let outcome = resolve("codex", &json!({"prompt": "hi"}), &c).unwrap();
        assert!(matches!(outcome, Outcome::Command(_)));
    }

    #[test]
    fn git_autocommit_requires_workdir() {
        let outcome = resolve("git-autocommit", &json!({}), &cfg()).unwrap();
        match outcome {
            Outcome::StartupError(msg) => assert!(msg.contains("workdir")),
            Outcome::Command(_) => panic!("expected a startup error"),
        }
    }

    #[test]
    fn git_autocommit_rejects_non_repo() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = resolve(
            "git-autocommit",
            &json!({"workdir": dir.path().to_str().unwrap()}),
            &cfg(),
        )
        .unwrap();
        match outcome {
            Outcome::StartupError(msg) => assert!(msg.contains("not a git repository")),
            Outcome::Command(_) => panic!("expected a startup error"),
        }
    }

    #[test]
    fn git_autocommit_branch_name_has_autobot_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let outcome = resolve(
            "git-autocommit",
            &json!({"workdir": dir.path().to_str().unwrap(), "subject": "feat: x"}),
            &cfg(),
        )
        .unwrap();
        match outcome {
            Outcome::Command(cmd) => {
                let branch = &cmd.args[3];
                assert!(branch.starts_with("autobot/"));
            }
            Outcome::StartupError(e) => panic!("unexpected startup error: {e}"),
        }
    }
}
