use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use contracts::system::auth::TokenClaims;

use super::cookie::read_admin_cookie;
use crate::shared::error::AppError;
use crate::shared::state::AppState;

/// Token from `Authorization: Bearer ...`, falling back to the admin cookie
fn extract_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| read_admin_cookie(req.headers()))
}

fn authenticate(state: &AppState, req: &Request<Body>) -> Result<TokenClaims, AppError> {
    let token = extract_token(req)
        .ok_or_else(|| AppError::Unauthenticated("Authentication required".into()))?;
    state
        .jwt
        .validate(&token)
        .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))
}

/// Middleware that requires valid authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Middleware that requires the admin claim
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = authenticate(&state, &req)?;
    if !claims.admin {
        return Err(AppError::PermissionDenied("Admin access required".into()));
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
