use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Wraps `tr_domain::Error` so handlers can return it directly and get
/// the right status code — the same taxonomy used by the dispatcher's
/// failure routine (validation/not_found/upstream/startup all become
/// `4xx`/`5xx` here the way they become task/tool-run failures there).
pub struct ApiError(pub tr_domain::Error);

impl From<tr_domain::Error> for ApiError {
    fn from(e: tr_domain::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = if self.0.is_validation() {
            (StatusCode::BAD_REQUEST, "bad_request")
        } else if self.0.is_not_found() {
            (StatusCode::NOT_FOUND, "not_found")
        } else if self.0.is_upstream() {
            (StatusCode::BAD_GATEWAY, "upstream_error")
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        };
        let body = Json(serde_json::json!({ "error": error, "message": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
