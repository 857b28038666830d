use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Request-level failure taxonomy. Validation and authorization variants are
/// produced before any mutation; `Internal` wraps persistence/broadcast
/// failures and is never silently swallowed.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("인증이 필요합니다")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("잘못된 상태 전환입니다")]
    InvalidTransition,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::InvalidTransition | Self::Validation(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Self::Internal(e) => {
                error!("internal error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "서버 오류가 발생했습니다".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Run blocking database work off the async runtime. The closure returns
/// `ApiError` directly so authorization/validation checks can short-circuit
/// inside the same lock scope as the reads they depend on.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task panicked: {e}")))?
}
