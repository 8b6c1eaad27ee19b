use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool Run Supervisor configuration (§4.3, §6 "Configuration").
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Root directory under which each tool-run gets its own
    /// `<run_id>/{stdout,stderr}.log` sub-directory.
    #[serde(default = "d_artifacts_dir")]
    pub artifacts_dir: String,
    /// Trailing line count returned by `GET /tool-runs/{id}` for
    /// `stdout_tail`/`stderr_tail`.
    #[serde(default = "d_tail_lines")]
    pub tail_lines: usize,
    /// Unix user to drop privileges to before `exec`. `None` disables
    /// privilege dropping (the default — and the only sane default on
    /// platforms with no such user model).
    #[serde(default)]
    pub privilege_drop_user: Option<String>,
    #[serde(default)]
    pub codex: CodexConfig,
    /// Adapter the dispatcher's inline tool-call stage (§4.2 step 5-7)
    /// invokes through the synchronous `/tooler/run` path. Defaults to
    /// `dummy` so a from-scratch checkout runs the full pipeline without
    /// any external binary configured.
    #[serde(default = "d_pipeline_tool_name")]
    pub pipeline_tool_name: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: d_artifacts_dir(),
            tail_lines: d_tail_lines(),
            privilege_drop_user: None,
            codex: CodexConfig::default(),
            pipeline_tool_name: d_pipeline_tool_name(),
        }
    }
}

impl SupervisorConfig {
    /// Clamp `tail_lines` to a sane range so a misconfigured value can't
    /// make every `GET /tool-runs/{id}` response unbounded.
    pub fn clamped(&self) -> Self {
        Self {
            tail_lines: self.tail_lines.clamp(1, 10_000),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexConfig {
    /// Home directory under which the `codex` auth credential file is
    /// expected to live.
    #[serde(default = "d_codex_home")]
    pub home_dir: String,
    /// Short-circuits the `codex` adapter to a deterministic echo
    /// command instead of shelling out to the real binary.
    #[serde(default)]
    pub mock: bool,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            home_dir: d_codex_home(),
            mock: false,
        }
    }
}

fn d_artifacts_dir() -> String {
    "./state/artifacts".into()
}
fn d_tail_lines() -> usize {
    200
}
fn d_codex_home() -> String {
    "~/.codex".into()
}
fn d_pipeline_tool_name() -> String {
    "dummy".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tail_lines_is_two_hundred() {
        assert_eq!(SupervisorConfig::default().tail_lines, 200);
    }

    #[test]
    fn clamp_below_min() {
        let cfg = SupervisorConfig {
            tail_lines: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.clamped().tail_lines, 1);
    }

    #[test]
    fn clamp_above_max() {
        let cfg = SupervisorConfig {
            tail_lines: 1_000_000,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.clamped().tail_lines, 10_000);
    }
}
