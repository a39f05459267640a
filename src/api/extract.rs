//! Request identity

use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, request::Parts};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::{ApiError, AppState};

pub const USER_HEADER: &str = "x-user-id";

/// Caller's user id, taken from the `X-User-Id` header set by the auth gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or_else(|| ApiError::Unauthorized("Please login to access this resource".into()))
    }
}

/// Guards `/admin` routes with the configured bearer token.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(expected) = state.admin_token.as_deref() {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match presented {
            None => return Err(ApiError::Unauthorized("Admin token required".into())),
            Some(token) if token != expected => {
                tracing::warn!(path = %request.uri().path(), "rejected admin token");
                return Err(ApiError::Forbidden("Not allowed to access this resource".into()));
            }
            Some(_) => {}
        }
    }
    Ok(next.run(request).await)
}
