use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tooler/run", post(run_sync))
        .route("/tool-runs", post(create_tool_run))
        .route("/tool-runs/:id", get(get_tool_run))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "service": "tool-supervisor" }))
}

#[derive(Debug, Deserialize)]
struct SyncRunBody {
    tool_name: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

async fn run_sync(
    State(state): State<AppState>,
    Json(body): Json<SyncRunBody>,
) -> ApiResult<Json<Value>> {
    let input = body
        .input
        .or_else(|| body.text.map(|text| serde_json::json!({ "text": text })))
        .unwrap_or_else(|| serde_json::json!({}));
    let result = tr_supervisor::sync_run::run(&body.tool_name, input, &state.supervisor_cfg).await?;
    Ok(Json(serde_json::to_value(result).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    tool_name: String,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    callback_url: Option<String>,
}

async fn create_tool_run(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let run = state
        .supervisor
        .create(&body.tool_name, body.input.unwrap_or_default(), body.callback_url)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "tool_run_id": run.id,
            "pid": run.pid,
            "status": run.status,
        })),
    ))
}

async fn get_tool_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let run = state
        .supervisor
        .get(&id)
        .ok_or_else(|| tr_supervisor::Supervisor::not_found(&id))?;
    let tail_n = state.supervisor_cfg.tail_lines;
    Ok(Json(serde_json::json!({
        "tool_run_id": run.id,
        "status": run.status,
        "stdout_tail": run.stdout_tail(tail_n),
        "stderr_tail": run.stderr_tail(tail_n),
        "artifacts": run.artifacts,
        "pid": run.pid,
        "exit_code": run.exit_code,
        "started_at": run.started_at,
        "finished_at": run.finished_at,
        "branch": run.branch,
        "commit_hash": run.commit_hash,
    })))
}
