use axum::extract::{Json, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use contracts::system::auth::{
    LoginRequest, LoginResponse, RegisterRequest, TokenClaims, TokenRequest, TokenResponse,
    UserInfo, VerifyRequest, VerifyResponse,
};

use crate::shared::error::{AppError, AppResult};
use crate::shared::state::AppState;
use crate::system::auth::cookie;
use crate::system::users::service as user_service;

/// Claims of a token that must belong to an admin: 401 if invalid, 403 if
/// the admin claim is missing
fn admin_claims(state: &AppState, token: &str) -> AppResult<TokenClaims> {
    let claims = state
        .jwt
        .validate(token)
        .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))?;
    if !claims.admin {
        return Err(AppError::PermissionDenied("Admin access required".into()));
    }
    Ok(claims)
}

/// Customer sign-up
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserInfo>)> {
    let user = user_service::register_customer(&state.db, request).await?;
    tracing::info!("Registered customer {}", user.id);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Exchange credentials for an id token
pub async fn token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = user_service::verify_credentials(&state.db, &request.email, &request.password)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("Invalid email or password".into()))?;

    let (id_token, expires_at) = state.jwt.issue(&user)?;
    Ok(Json(TokenResponse {
        id_token,
        expires_at,
        user: user.into(),
    }))
}

/// Admin session: verifies the id token and installs it as an http-only cookie
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let claims = admin_claims(&state, &request.id_token)?;
    let max_age = (claims.exp as i64 - Utc::now().timestamp()).max(0);
    let cookie = cookie::admin_cookie(
        &request.id_token,
        max_age,
        state.config.auth.secure_cookies,
    );

    let body = LoginResponse {
        success: true,
        uid: claims.sub,
        email: claims.email,
    };
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = cookie::clear_admin_cookie(state.config.auth.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}

/// Check whether a token belongs to an admin
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> AppResult<Json<VerifyResponse>> {
    let claims = admin_claims(&state, &request.token)?;
    Ok(Json(VerifyResponse {
        is_admin: claims.admin,
        uid: claims.sub,
        email: claims.email,
    }))
}
