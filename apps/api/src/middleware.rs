use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use casare_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Resolves the bearer credential on every request into a `Principal`,
/// inserted into the request's extensions for handlers to read.
///
/// Every route under this layer requires a valid API key; there is no
/// anonymous or cookie-session path, since the orchestrator is driven by
/// automation and robots rather than a browser client.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("authorization header missing".to_owned()))?;

    let presented = header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthenticated("authorization scheme must be Bearer".to_owned()))?;

    let principal = state.tenant_gateway.authenticate_api_key(presented).await?;
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
