//! End-to-end tests for the pipeline dispatcher against stubbed
//! collaborators, covering the state machine path a real task takes
//! from creation to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tr_domain::config::{CollaboratorsConfig, SupervisorConfig};
use tr_domain::model::{InputType, TaskStatus};
use tr_gateway::dispatcher::{self, DispatchCtx};

async fn stub_collaborators() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/asr/transcribe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transcript_text": "this is the transcript",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/refine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refined_text": "this is the refined text",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/summarize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "summary_text": "a short summary",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tts/synthesize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "audio_uri": "s3://bucket/out.wav",
        })))
        .mount(&server)
        .await;
    server
}

fn ctx_against(server: &MockServer, state_dir: &std::path::Path) -> DispatchCtx {
    let mut collab_cfg = CollaboratorsConfig::default();
    collab_cfg.asr_base_url = server.uri();
    collab_cfg.refine_base_url = server.uri();
    collab_cfg.summarizer_base_url = server.uri();
    collab_cfg.tts_base_url = server.uri();

    DispatchCtx {
        store: Arc::new(tr_store::Store::new(state_dir)),
        collab: Arc::new(tr_collab::CollabClients::new(collab_cfg)),
        supervisor_cfg: SupervisorConfig::default(),
    }
}

/// Poll the store until the task reaches a terminal status or the
/// deadline passes, returning the last-seen task.
async fn wait_for_terminal(store: &tr_store::Store, task_id: uuid::Uuid) -> tr_domain::model::Task {
    for _ in 0..200 {
        if let Some(task) = store.get_task(&task_id).await {
            if task.status.is_terminal() {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} did not reach a terminal status in time");
}

#[tokio::test]
async fn text_task_is_delivered_without_tts() {
    let server = stub_collaborators().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_against(&server, dir.path());
    let store = Arc::clone(&ctx.store);

    let project = store.create_project("demo".into(), None).await;
    let task = store
        .create_task(project.id, InputType::Text, Some("raw input".into()), None)
        .await
        .unwrap();

    let tx = dispatcher::spawn(ctx);
    tx.send(task.id).unwrap();

    let finished = wait_for_terminal(&store, task.id).await;
    assert_eq!(finished.status, TaskStatus::Delivered);
    assert_eq!(finished.refined_text.as_deref(), Some("this is the refined text"));
    assert_eq!(finished.final_summary.as_deref(), Some("a short summary"));
    assert!(finished.final_audio_uri.is_none());
    assert!(finished.transcript.is_none());
}

#[tokio::test]
async fn voice_task_is_delivered_with_transcript_and_audio() {
    let server = stub_collaborators().await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_against(&server, dir.path());
    let store = Arc::clone(&ctx.store);

    let project = store.create_project("demo".into(), None).await;
    let task = store
        .create_task(
            project.id,
            InputType::Voice,
            None,
            Some("s3://bucket/in.wav".into()),
        )
        .await
        .unwrap();

    let tx = dispatcher::spawn(ctx);
    tx.send(task.id).unwrap();

    let finished = wait_for_terminal(&store, task.id).await;
    assert_eq!(finished.status, TaskStatus::Delivered);
    assert_eq!(finished.transcript.as_deref(), Some("this is the transcript"));
    assert_eq!(finished.final_audio_uri.as_deref(), Some("s3://bucket/out.wav"));
}

#[tokio::test]
async fn empty_refine_result_fails_the_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/refine"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "refined_text": "   " })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let ctx = ctx_against(&server, dir.path());
    let store = Arc::clone(&ctx.store);

    let project = store.create_project("demo".into(), None).await;
    let task = store
        .create_task(project.id, InputType::Text, Some("raw input".into()), None)
        .await
        .unwrap();

    let tx = dispatcher::spawn(ctx);
    tx.send(task.id).unwrap();

    let finished = wait_for_terminal(&store, task.id).await;
    assert_eq!(finished.status, TaskStatus::Failed);
    let reason = finished.failure_reason.expect("failure_reason should be set");
    assert!(reason.contains("refine"));
}

#[tokio::test]
async fn unconfigured_pipeline_tool_fails_the_task() {
    let server = stub_collaborators().await;
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = ctx_against(&server, dir.path());
    ctx.supervisor_cfg.pipeline_tool_name = "rm-rf".into();
    let store = Arc::clone(&ctx.store);

    let project = store.create_project("demo".into(), None).await;
    let task = store
        .create_task(project.id, InputType::Text, Some("raw input".into()), None)
        .await
        .unwrap();

    let tx = dispatcher::spawn(ctx);
    tx.send(task.id).unwrap();

    let finished = wait_for_terminal(&store, task.id).await;
    assert_eq!(finished.status, TaskStatus::Failed);
    let reason = finished.failure_reason.expect("failure_reason should be set");
    assert!(reason.contains("not allowed"));
}
