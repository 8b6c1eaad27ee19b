use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// External collaborator endpoints (§6) the dispatcher calls out to.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default = "d_asr_url")]
    pub asr_base_url: String,
    #[serde(default = "d_refine_url")]
    pub refine_base_url: String,
    #[serde(default = "d_summarizer_url")]
    pub summarizer_base_url: String,
    #[serde(default = "d_tts_url")]
    pub tts_base_url: String,
    #[serde(default = "d_tooler_url")]
    pub tooler_base_url: String,
    /// Fire-and-forget delivery callback. Unset ⇒ step 11 of the
    /// dispatcher's pipeline is skipped entirely.
    #[serde(default)]
    pub bot_callback_url: Option<String>,
    #[serde(default = "d_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "d_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            asr_base_url: d_asr_url(),
            refine_base_url: d_refine_url(),
            summarizer_base_url: d_summarizer_url(),
            tts_base_url: d_tts_url(),
            tooler_base_url: d_tooler_url(),
            bot_callback_url: None,
            upstream_timeout_secs: d_upstream_timeout_secs(),
            callback_timeout_secs: d_callback_timeout_secs(),
        }
    }
}

fn d_asr_url() -> String {
    "http://localhost:8010".into()
}
fn d_refine_url() -> String {
    "http://localhost:8011".into()
}
fn d_summarizer_url() -> String {
    "http://localhost:8012".into()
}
fn d_tts_url() -> String {
    "http://localhost:8013".into()
}
fn d_tooler_url() -> String {
    "http://127.0.0.1:8001".into()
}
fn d_upstream_timeout_secs() -> u64 {
    20
}
fn d_callback_timeout_secs() -> u64 {
    5
}
