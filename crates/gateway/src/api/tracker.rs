use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use tr_domain::model::{InputType, TaskStatus, ToolRun, ToolRunStatus};
use tr_domain::trace::TraceEvent;
use tr_store::TaskPatch;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/:id", get(get_project))
        .route("/tasks", post(create_task))
        .route("/tasks/:id", get(get_task).patch(patch_task))
        .route("/tool-runs", post(create_tool_run))
        .route("/tool-runs/:id", get(get_tool_run))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "service": "tracker" }))
}

#[derive(Debug, Deserialize)]
struct CreateProjectBody {
    name: String,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectBody>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let project = state.store.create_project(body.name, body.metadata).await;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.store.list_projects().await).unwrap_or_default())
}

async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let project = state
        .store
        .get_project(&id)
        .await
        .ok_or_else(|| tr_domain::Error::not_found(format!("project {id} not found")))?;
    Ok(Json(serde_json::to_value(project).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct CreateTaskBody {
    project_id: Uuid,
    input_type: InputType,
    #[serde(default)]
    raw_text: Option<String>,
    #[serde(default)]
    raw_audio_uri: Option<String>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match body.input_type {
        InputType::Text if body.raw_text.is_none() => {
            return Err(tr_domain::Error::validation("raw_text is required for input_type=text").into())
        }
        InputType::Voice if body.raw_audio_uri.is_none() => {
            return Err(
                tr_domain::Error::validation("raw_audio_uri is required for input_type=voice").into(),
            )
        }
        _ => {}
    }

    let task = state
        .store
        .create_task(body.project_id, body.input_type, body.raw_text, body.raw_audio_uri)
        .await?;

    TraceEvent::TaskCreated {
        task_id: task.id.to_string(),
        project_id: task.project_id.to_string(),
        input_type: format!("{:?}", task.input_type),
    }
    .emit();

    let _ = state.dispatch_tx.send(task.id);
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let task = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| tr_domain::Error::not_found(format!("task {id} not found")))?;
    let history = state.store.get_task_history(&id).await;

    let mut body = serde_json::to_value(task).unwrap_or_default();
    if let Value::Object(map) = &mut body {
        map.insert(
            "status_history".into(),
            serde_json::to_value(history).unwrap_or_default(),
        );
    }
    Ok(Json(body))
}

const PATCH_WHITELIST: &[&str] = &[
    "status",
    "transcript",
    "refined_text",
    "final_summary",
    "final_audio_uri",
    "raw_audio_uri",
    "failure_reason",
];

async fn patch_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let Value::Object(fields) = &body else {
        return Err(tr_domain::Error::validation("patch body must be a JSON object").into());
    };
    for key in fields.keys() {
        if !PATCH_WHITELIST.contains(&key.as_str()) {
            return Err(tr_domain::Error::validation(format!("unknown field: {key}")).into());
        }
    }

    let mut patch = TaskPatch::default();
    if let Some(v) = fields.get("status") {
        patch.status = Some(
            serde_json::from_value::<TaskStatus>(v.clone())
                .map_err(|e| tr_domain::Error::validation(format!("invalid status: {e}")))?,
        );
    }
    macro_rules! str_field {
        ($name:literal, $field:ident) => {
            if let Some(v) = fields.get($name) {
                patch.$field = Some(
                    v.as_str()
                        .ok_or_else(|| tr_domain::Error::validation(format!("{} must be a string", $name)))?
                        .to_string(),
                );
            }
        };
    }
    str_field!("transcript", transcript);
    str_field!("refined_text", refined_text);
    str_field!("final_summary", final_summary);
    str_field!("final_audio_uri", final_audio_uri);
    str_field!("raw_audio_uri", raw_audio_uri);
    str_field!("failure_reason", failure_reason);

    let task = state.store.apply_patch(&id, patch).await?;
    Ok(Json(serde_json::to_value(task).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
struct CreateToolRunBody {
    task_id: Uuid,
    tool_name: String,
    #[serde(default)]
    status: Option<ToolRunStatus>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn create_tool_run(
    State(state): State<AppState>,
    Json(body): Json<CreateToolRunBody>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let run = ToolRun::new_record(
        body.task_id,
        body.tool_name,
        body.status.unwrap_or(ToolRunStatus::Queued),
        body.input,
        body.output,
        body.started_at,
        body.finished_at,
    );
    let run = state.store.create_tool_run(run).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn get_tool_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let run = state
        .store
        .get_tool_run(&id)
        .await
        .ok_or_else(|| tr_domain::Error::not_found(format!("tool run {id} not found")))?;
    Ok(Json(serde_json::to_value(run).unwrap_or_default()))
}
