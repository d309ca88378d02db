use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use casare_core::AppError;

mod types;

pub use types::ErrorResponse;

/// HTTP wrapper around the orchestrator's core error taxonomy.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after_seconds = match &self.0 {
            AppError::RateLimited { retry_after, .. } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let status = match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::QuotaExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::LeaseLost(_) => StatusCode::CONFLICT,
            AppError::DependencyCycle(_) => StatusCode::BAD_REQUEST,
            AppError::TransientIO(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ChainBroken(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorResponse::new(self.0.to_string()));

        match retry_after_seconds {
            Some(seconds) => (status, [("retry-after", seconds.to_string())], payload).into_response(),
            None => (status, payload).into_response(),
        }
    }
}

/// Standard handler result type.
pub type ApiResult<T> = Result<T, ApiError>;
