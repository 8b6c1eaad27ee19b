/// Shared error type used across all orchestration core crates.
///
/// Variants map onto the error taxonomy that the HTTP surface and the
/// dispatcher/supervisor failure routines translate into their respective
/// outcomes (HTTP status, task failure, tool-run failure).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream {collaborator}: {message}")]
    Upstream { collaborator: String, message: String },

    #[error("startup: {0}")]
    Startup(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn upstream(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether this error should be reported through the HTTP `400` path.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether this error should be reported through the HTTP `404` path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether this error should be reported through the HTTP `502` path
    /// (§7: a collaborator call surfaced synchronously).
    pub fn is_upstream(&self) -> bool {
        matches!(self, Error::Upstream { .. })
    }

    /// Truncate the error's display text to at most `max_chars`, as required
    /// for `Task.failure_reason` (capped at 500 characters).
    pub fn truncated_message(&self, max_chars: usize) -> String {
        let message = self.to_string();
        if message.chars().count() <= max_chars {
            message
        } else {
            message.chars().take(max_chars).collect()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
