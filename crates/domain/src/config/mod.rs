mod collaborators;
mod server;
mod store;
mod supervisor;

pub use collaborators::*;
pub use server::*;
pub use store::*;
pub use supervisor::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "ServerConfig::tracker_default")]
    pub tracker_server: ServerConfig,
    #[serde(default = "ServerConfig::supervisor_default")]
    pub supervisor_server: ServerConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker_server: ServerConfig::tracker_default(),
            supervisor_server: ServerConfig::supervisor_default(),
            collaborators: CollaboratorsConfig::default(),
            supervisor: SupervisorConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

fn check_base_url(errors: &mut Vec<ConfigError>, field: &str, url: &str) {
    if url.is_empty() {
        errors.push(ConfigError {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: "base_url must not be empty".into(),
        });
        return;
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        errors.push(ConfigError {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: format!("base_url must start with http:// or https:// (got \"{url}\")"),
        });
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (field, port) in [
            ("tracker_server.port", self.tracker_server.port),
            ("supervisor_server.port", self.supervisor_server.port),
        ] {
            if port == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: field.into(),
                    message: "port must be greater than 0".into(),
                });
            }
        }

        if self.tracker_server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tracker_server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.supervisor_server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor_server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.tracker_server.port != 0
            && self.tracker_server.port == self.supervisor_server.port
            && self.tracker_server.host == self.supervisor_server.host
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor_server.port".into(),
                message: "tracker and supervisor servers must not bind the same host:port".into(),
            });
        }

        check_base_url(
            &mut errors,
            "collaborators.asr_base_url",
            &self.collaborators.asr_base_url,
        );
        check_base_url(
            &mut errors,
            "collaborators.refine_base_url",
            &self.collaborators.refine_base_url,
        );
        check_base_url(
            &mut errors,
            "collaborators.summarizer_base_url",
            &self.collaborators.summarizer_base_url,
        );
        check_base_url(
            &mut errors,
            "collaborators.tts_base_url",
            &self.collaborators.tts_base_url,
        );
        check_base_url(
            &mut errors,
            "collaborators.tooler_base_url",
            &self.collaborators.tooler_base_url,
        );
        if let Some(url) = &self.collaborators.bot_callback_url {
            check_base_url(&mut errors, "collaborators.bot_callback_url", url);
        }

        if self.collaborators.upstream_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "collaborators.upstream_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.collaborators.callback_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "collaborators.callback_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.supervisor.artifacts_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.artifacts_dir".into(),
                message: "must not be empty".into(),
            });
        }
        if self.supervisor.tail_lines == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "supervisor.tail_lines".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.store.state_dir.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "store.state_dir".into(),
                message: "must not be empty".into(),
            });
        }

        for (field, cors) in [
            ("tracker_server.cors", &self.tracker_server.cors),
            ("supervisor_server.cors", &self.supervisor_server.cors),
        ] {
            if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: field.into(),
                    message: "wildcard \"*\" allows all origins (not recommended for production)"
                        .into(),
                });
            }
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
