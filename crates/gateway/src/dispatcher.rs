//! The pipeline dispatcher: a single background worker draining a FIFO
//! queue of task ids and driving each task through the full state
//! machine, one task at a time.
//!
//! Tool execution goes straight through `tr_supervisor::sync_run::run`
//! in process rather than over HTTP to the supervisor's own surface —
//! both live in this one binary, so there is no wire boundary to cross
//! for a call the dispatcher itself makes.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use tr_domain::model::{InputType, TaskStatus};
use tr_domain::trace::TraceEvent;
use tr_domain::Error;

/// Everything the dispatcher needs. A standalone type (rather than
/// reusing `AppState`) because the dispatcher has to exist before
/// `AppState`'s own `dispatch_tx` field can be filled in.
#[derive(Clone)]
pub struct DispatchCtx {
    pub store: Arc<tr_store::Store>,
    pub collab: Arc<tr_collab::CollabClients>,
    pub supervisor_cfg: tr_domain::config::SupervisorConfig,
}

pub fn spawn(state: DispatchCtx) -> mpsc::UnboundedSender<Uuid> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Uuid>();
    tokio::spawn(async move {
        while let Some(task_id) = rx.recv().await {
            if let Err(e) = process_task(&state, task_id).await {
                tracing::error!(task_id = %task_id, error = %e, "pipeline step failed");
                let before = state.store.get_task(&task_id).await.map(|t| format!("{:?}", t.status));
                let reason = e.truncated_message(tr_domain::model::FAILURE_REASON_MAX_CHARS);
                if state.store.fail_task(&task_id, &reason).await.is_ok() {
                    TraceEvent::TaskFailed {
                        task_id: task_id.to_string(),
                        from: before.unwrap_or_else(|| "UNKNOWN".into()),
                        failure_reason: reason,
                    }
                    .emit();
                }
                notify_terminal(&state, task_id).await;
            }
        }
    });
    tx
}

async fn process_task(state: &DispatchCtx, task_id: Uuid) -> tr_domain::Result<()> {
    let task = state
        .store
        .get_task(&task_id)
        .await
        .ok_or_else(|| tr_domain::Error::not_found(format!("task {task_id} not found")))?;
    if task.status.is_terminal() {
        return Ok(());
    }

    transition(state, task_id, TaskStatus::Routed).await?;

    let task = state.store.get_task(&task_id).await.expect("task exists");
    let text_for_refine = if task.input_type == InputType::Voice {
        transition(state, task_id, TaskStatus::Transcribing).await?;
        let audio_uri = task.raw_audio_uri.clone().ok_or_else(|| {
            tr_domain::Error::validation("voice task is missing raw_audio_uri")
        })?;
        let transcript = state.collab.transcribe(task_id, &audio_uri).await?;
        if transcript.trim().is_empty() {
            return Err(Error::upstream("asr", "transcript is empty"));
        }
        apply_patch(state, task_id, |p| p.transcript = Some(transcript.clone())).await?;
        transition(state, task_id, TaskStatus::Refining).await?;
        transcript
    } else {
        transition(state, task_id, TaskStatus::Refining).await?;
        task.raw_text.clone().unwrap_or_default()
    };

    // Refine always receives an empty project list (§9 resolution of the
    // Refine Open Question) — richer project inference is future work.
    let refined = state.collab.refine(task_id, &text_for_refine, &[]).await?;
    if refined.refined_text.trim().is_empty() {
        return Err(Error::upstream("refine", "refined_text is empty"));
    }
    apply_patch(state, task_id, |p| p.refined_text = Some(refined.refined_text.clone())).await?;

    transition(state, task_id, TaskStatus::ToolQueued).await?;
    let tool_run = state
        .store
        .create_tool_run(tr_domain::model::ToolRun::new_record(
            task_id,
            "tooler".to_string(),
            tr_domain::model::ToolRunStatus::Queued,
            Some(serde_json::json!({ "text": refined.refined_text })),
            None,
            None,
            None,
        ))
        .await?;

    transition(state, task_id, TaskStatus::ToolRunning).await?;
    state
        .store
        .update_tool_run(&tool_run.id, |run| {
            run.status = tr_domain::model::ToolRunStatus::Running;
            run.started_at = Some(chrono::Utc::now());
        })
        .await;

    let sync_result = match tr_supervisor::sync_run::run(
        &state.supervisor_cfg.pipeline_tool_name,
        serde_json::json!({ "text": refined.refined_text }),
        &state.supervisor_cfg,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            state
                .store
                .update_tool_run(&tool_run.id, |run| {
                    run.status = tr_domain::model::ToolRunStatus::Failed;
                    run.output = Some(serde_json::json!({ "error": e.to_string() }));
                    run.finished_at = Some(chrono::Utc::now());
                })
                .await;
            return Err(e);
        }
    };

    state
        .store
        .update_tool_run(&tool_run.id, |run| {
            run.output = Some(serde_json::to_value(&sync_result).unwrap_or_default());
            run.status = if sync_result.exit_code == 0 {
                tr_domain::model::ToolRunStatus::Succeeded
            } else {
                tr_domain::model::ToolRunStatus::Failed
            };
            run.finished_at = Some(chrono::Utc::now());
        })
        .await;

    if sync_result.exit_code != 0 {
        return Err(Error::upstream(
            "tooler",
            format!("tool run exited {}: {}", sync_result.exit_code, sync_result.stderr),
        ));
    }

    transition(state, task_id, TaskStatus::Summarizing).await?;
    let summary = state
        .collab
        .summarize(
            task_id,
            &refined.refined_text,
            &sync_result.result_text,
            &sync_result.stderr,
            if task.input_type == InputType::Voice {
                "audio"
            } else {
                "text"
            },
        )
        .await?;
    if summary.summary_text.trim().is_empty() {
        return Err(Error::upstream("summarizer", "summary_text is empty"));
    }
    apply_patch(state, task_id, |p| p.final_summary = Some(summary.summary_text.clone())).await?;

    if task.input_type == InputType::Voice {
        transition(state, task_id, TaskStatus::TtsGenerating).await?;
        let audio_uri = state.collab.synthesize(task_id, &summary.summary_text).await?;
        apply_patch(state, task_id, |p| p.final_audio_uri = Some(audio_uri)).await?;
    }

    transition(state, task_id, TaskStatus::Delivered).await?;
    notify_terminal(state, task_id).await;
    Ok(())
}

async fn transition(state: &DispatchCtx, task_id: Uuid, next: TaskStatus) -> tr_domain::Result<()> {
    let before = state.store.get_task(&task_id).await.map(|t| t.status);
    state.store.transition_task(&task_id, next).await?;
    TraceEvent::TaskTransition {
        task_id: task_id.to_string(),
        from: before.map(|s| format!("{s:?}")),
        to: format!("{next:?}"),
    }
    .emit();
    Ok(())
}

async fn apply_patch(
    state: &DispatchCtx,
    task_id: Uuid,
    f: impl FnOnce(&mut tr_store::TaskPatch),
) -> tr_domain::Result<()> {
    let mut patch = tr_store::TaskPatch::default();
    f(&mut patch);
    state.store.apply_patch(&task_id, patch).await?;
    Ok(())
}

async fn notify_terminal(state: &DispatchCtx, task_id: Uuid) {
    let Some(task) = state.store.get_task(&task_id).await else {
        return;
    };
    let status = if task.status == TaskStatus::Delivered {
        "DELIVERED"
    } else {
        "FAILED"
    };
    state
        .collab
        .notify_bot(
            task_id,
            status,
            task.final_summary.as_deref(),
            task.final_audio_uri.as_deref(),
        )
        .await;
}
