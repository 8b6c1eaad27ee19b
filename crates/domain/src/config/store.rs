use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistent store configuration.
//
// The specification describes a single-file relational database; this
// implementation substitutes a JSON-file-backed store under `state_dir`
// (see DESIGN.md for the substitution rationale). `state_dir` is this
// implementation's equivalent of the spec's single-file `database_url`.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_state_dir")]
    pub state_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
        }
    }
}

fn d_state_dir() -> String {
    "./state".into()
}
