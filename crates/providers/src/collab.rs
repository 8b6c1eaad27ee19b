//! Thin HTTP clients for the collaborator services (ASR, Refine,
//! Summarizer, TTS) plus the best-effort bot completion callback.
//!
//! Each collaborator is a plain JSON-in/JSON-out POST with no auth and
//! no streaming, so these clients are a small fraction of what
//! `openai_compat`'s request/response plumbing does — they share its
//! shape (a timed `reqwest::Client`, a status-check-then-parse helper)
//! without its provider-routing, SSE, or tool-call machinery.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use tr_domain::config::CollaboratorsConfig;
use tr_domain::trace::TraceEvent;
use tr_domain::{Error, Result};

pub struct CollabClients {
    cfg: CollaboratorsConfig,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct RefineResult {
    pub refined_text: String,
    pub inferred_project_slug: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SummarizeResult {
    pub summary_text: String,
}

impl CollabClients {
    pub fn new(cfg: CollaboratorsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.upstream_timeout_secs.max(1)))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self { cfg, http }
    }

    pub async fn transcribe(&self, task_id: Uuid, audio_uri: &str) -> Result<String> {
        let body = json!({ "audio_uri": audio_uri });
        let resp: serde_json::Value = self
            .post(
                task_id,
                "asr",
                &format!("{}/asr/transcribe", self.cfg.asr_base_url),
                &body,
            )
            .await?;
        text_field(&resp, &["transcript_text", "transcript"])
            .ok_or_else(|| Error::upstream("asr", "response missing transcript_text"))
    }

    pub async fn refine(&self, task_id: Uuid, text: &str, projects: &[String]) -> Result<RefineResult> {
        let body = json!({ "text": text, "projects": projects });
        let resp: serde_json::Value = self
            .post(task_id, "refine", &format!("{}/refine", self.cfg.refine_base_url), &body)
            .await?;
        let refined_text = text_field(&resp, &["refined_text"])
            .ok_or_else(|| Error::upstream("refine", "response missing refined_text"))?;
        let inferred_project_slug = resp
            .get("inferred_project_slug")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(RefineResult {
            refined_text,
            inferred_project_slug,
        })
    }

    pub async fn summarize(
        &self,
        task_id: Uuid,
        refined_text: &str,
        tool_stdout: &str,
        tool_stderr: &str,
        mode: &str,
    ) -> Result<SummarizeResult> {
        let body = json!({
            "refined_text": refined_text,
            "tool_stdout": tool_stdout,
            "tool_stderr": tool_stderr,
            "mode": mode,
        });
        let resp: serde_json::Value = self
            .post(
                task_id,
                "summarizer",
                &format!("{}/summarize", self.cfg.summarizer_base_url),
                &body,
            )
            .await?;
        let summary_text = text_field(&resp, &["summary_text", "summary"])
            .ok_or_else(|| Error::upstream("summarizer", "response missing summary_text"))?;
        Ok(SummarizeResult { summary_text })
    }

    pub async fn synthesize(&self, task_id: Uuid, text: &str) -> Result<String> {
        let body = json!({ "text": text, "task_id": task_id });
        let resp: serde_json::Value = self
            .post(task_id, "tts", &format!("{}/tts/synthesize", self.cfg.tts_base_url), &body)
            .await?;
        text_field(&resp, &["audio_uri"])
            .ok_or_else(|| Error::upstream("tts", "response missing audio_uri"))
    }

    /// Best-effort notification to the owning bot once a task reaches a
    /// terminal state. Failures are logged, never propagated — a missed
    /// callback must not fail the task that already completed.
    pub async fn notify_bot(
        &self,
        task_id: Uuid,
        status: &str,
        summary: Option<&str>,
        audio_uri: Option<&str>,
    ) {
        let Some(url) = self.cfg.bot_callback_url.clone() else {
            return;
        };
        let body = json!({
            "task_id": task_id,
            "status": status,
            "summary": summary,
            "audio_uri": audio_uri,
        });
        let timeout = std::time::Duration::from_secs(self.cfg.callback_timeout_secs.max(1));
        let send = self.http.post(&url).timeout(timeout).json(&body).send();
        match send.await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => tracing::warn!(%task_id, status = %resp.status(), "bot callback rejected"),
            Err(e) => tracing::warn!(%task_id, error = %e, "bot callback failed"),
        }
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        task_id: Uuid,
        collaborator: &str,
        url: &str,
        body: &T,
    ) -> Result<R> {
        let started = std::time::Instant::now();
        let result = self.post_inner(collaborator, url, body).await;
        TraceEvent::CollaboratorCall {
            task_id: task_id.to_string(),
            collaborator: collaborator.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcome: if result.is_ok() { "ok".into() } else { "error".into() },
        }
        .emit();
        result
    }

    async fn post_inner<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        collaborator: &str,
        url: &str,
        body: &T,
    ) -> Result<R> {
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::upstream(collaborator, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                collaborator,
                format!("HTTP {status}: {text}"),
            ));
        }

        resp.json::<R>()
            .await
            .map_err(|e| Error::upstream(collaborator, format!("bad response body: {e}")))
    }
}

fn text_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(k).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn clients_against(server: &MockServer) -> CollabClients {
        let mut cfg = CollaboratorsConfig::default();
        cfg.asr_base_url = server.uri();
        cfg.refine_base_url = server.uri();
        cfg.summarizer_base_url = server.uri();
        cfg.tts_base_url = server.uri();
        CollabClients::new(cfg)
    }

    #[tokio::test]
    async fn transcribe_reads_transcript_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/asr/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript_text": "hello world",
            })))
            .mount(&server)
            .await;

        let clients = clients_against(&server).await;
        let transcript = clients.transcribe(Uuid::new_v4(), "s3://bucket/a.wav").await.unwrap();
        assert_eq!(transcript, "hello world");
    }

    #[tokio::test]
    async fn transcribe_accepts_transcript_alias() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/asr/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "transcript": "also hello",
            })))
            .mount(&server)
            .await;

        let clients = clients_against(&server).await;
        assert_eq!(
            clients.transcribe(Uuid::new_v4(), "uri").await.unwrap(),
            "also hello"
        );
    }

    #[tokio::test]
    async fn refine_sends_empty_projects_and_reads_refined_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "refined_text": "cleaned up text",
            })))
            .mount(&server)
            .await;

        let clients = clients_against(&server).await;
        let result = clients.refine(Uuid::new_v4(), "raw text", &[]).await.unwrap();
        assert_eq!(result.refined_text, "cleaned up text");
        assert!(result.inferred_project_slug.is_none());
    }

    #[tokio::test]
    async fn non_success_status_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/refine"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let clients = clients_against(&server).await;
        let err = clients.refine(Uuid::new_v4(), "raw text", &[]).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn missing_expected_field_becomes_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let clients = clients_against(&server).await;
        let err = clients
            .summarize(Uuid::new_v4(), "refined", "stdout", "stderr", "text")
            .await
            .unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn notify_bot_is_a_noop_without_a_callback_url() {
        // No mock mounted anywhere — if this tried to send anything it
        // would have no server to talk to and the test would hang or error.
        let cfg = CollaboratorsConfig::default();
        let clients = CollabClients::new(cfg);
        clients
            .notify_bot(Uuid::new_v4(), "DELIVERED", Some("summary"), None)
            .await;
    }
}
