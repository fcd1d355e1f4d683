use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use contracts::system::auth::TokenClaims;
use contracts::system::rate_limit::RateLimitPolicy;
use std::net::SocketAddr;

use super::service;
use crate::shared::error::AppError;
use crate::shared::state::AppState;

/// Peer address, then the first `X-Forwarded-For` hop
pub fn client_ip(req: &Request<Body>) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Authenticated user id, falling back to the client address
fn caller_id(req: &Request<Body>) -> String {
    req.extensions()
        .get::<TokenClaims>()
        .map(|claims| claims.sub.clone())
        .unwrap_or_else(|| client_ip(req))
}

/// Public routes: `public_ip` policy per client address
pub async fn limit_public(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    service::enforce(&state.db, &client_ip(&req), &RateLimitPolicy::PUBLIC_IP).await?;
    Ok(next.run(req).await)
}

/// Customer routes: `api` policy per user. Must run after `require_auth`.
pub async fn limit_customer(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    service::enforce(&state.db, &caller_id(&req), &RateLimitPolicy::GENERAL_API).await?;
    Ok(next.run(req).await)
}

/// Admin routes: `admin_api` policy per user. Must run after `require_admin`.
pub async fn limit_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    service::enforce(&state.db, &caller_id(&req), &RateLimitPolicy::ADMIN_API).await?;
    Ok(next.run(req).await)
}
