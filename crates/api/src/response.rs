use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptlab_runtime::RuntimeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type AppSuccess = GenericResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The envelope every JSON endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericResponse {
    #[serde(skip)]
    pub code: u16,
    pub status: ResponseStatus,
    pub data: Value,
    pub message: String,
}

impl GenericResponse {
    pub fn new(status: StatusCode, message: &str, data: Value) -> Self {
        Self {
            code: status.as_u16(),
            status: ResponseStatus::Success,
            data,
            message: message.to_string(),
        }
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self {
            code: status.as_u16(),
            status: ResponseStatus::Error,
            data: Value::Null,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for GenericResponse {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (code, Json(self)).into_response()
    }
}

#[derive(Debug)]
pub struct AppError(pub StatusCode, pub anyhow::Error);
impl AppError {
    pub fn new(status: StatusCode, err: anyhow::Error) -> Self {
        Self(status, err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("CODE: {}, MESSAGE: {}", self.0.as_u16(), self.1);
        GenericResponse::error(self.0, &self.1.to_string()).into_response()
    }
}

fn status_of(err: &anyhow::Error) -> StatusCode {
    if let Some(runtime_err) = err.downcast_ref::<RuntimeError>() {
        return StatusCode::from_u16(runtime_err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    }
    if err.is::<JsonRejection>()
        || err.is::<QueryRejection>()
        || err.is::<PathRejection>()
        || err.is::<MultipartRejection>()
        || err.is::<MultipartError>()
    {
        return StatusCode::BAD_REQUEST;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

// `?` on any error picks the status from the error kind.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self(status_of(&err), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::json;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn success_envelope() {
        let response = AppSuccess::new(StatusCode::CREATED, "Prompt created successfully", json!({ "version": 1 }))
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({
            "status": "success",
            "data": { "version": 1 },
            "message": "Prompt created successfully",
        }));
    }

    #[tokio::test]
    async fn error_envelope_has_null_data() {
        let response = AppError::from(RuntimeError::not_found("Prompt x not found")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({
            "status": "error",
            "data": null,
            "message": "Prompt x not found",
        }));
    }

    #[test]
    fn status_follows_error_kind() {
        assert_eq!(AppError::from(RuntimeError::bad_request("x")).0, StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(RuntimeError::conflict("x")).0, StatusCode::CONFLICT);
        assert_eq!(AppError::from(RuntimeError::UnknownMetric("bleu".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(AppError::from(sqlx::Error::RowNotFound).0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::from(anyhow::anyhow!("boom")).0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
