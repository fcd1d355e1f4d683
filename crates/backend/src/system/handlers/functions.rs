//! Callable endpoints under `/api/functions/<name>`. All require an
//! authenticated caller.

use axum::extract::{Json, State};
use contracts::system::users::{CreateAdminUserRequest, CreateAdminUserResponse};
use contracts::system::verification::{
    SendVerificationCodeRequest, SendVerificationCodeResponse, VerifyCodeRequest,
    VerifyCodeResponse,
};

use crate::shared::error::AppResult;
use crate::shared::state::AppState;
use crate::system::auth::extractor::CurrentUser;
use crate::system::users::service as user_service;
use crate::system::verification::service as verification;

pub async fn create_admin_user(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<CreateAdminUserRequest>,
) -> AppResult<Json<CreateAdminUserResponse>> {
    let user = user_service::create_admin_user(&state.db, &claims, request).await?;
    Ok(Json(CreateAdminUserResponse {
        success: true,
        message: format!("Admin user {} created", user.email),
        admin_id: Some(user.id),
    }))
}

pub async fn send_verification_code(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<SendVerificationCodeRequest>,
) -> AppResult<Json<SendVerificationCodeResponse>> {
    let response = verification::send_code(
        &state.db,
        state.sms.as_ref(),
        &state.config.verification,
        &claims.sub,
        request,
    )
    .await?;
    Ok(Json(response))
}

pub async fn verify_code(
    State(state): State<AppState>,
    CurrentUser(claims): CurrentUser,
    Json(request): Json<VerifyCodeRequest>,
) -> AppResult<Json<VerifyCodeResponse>> {
    let response =
        verification::verify_code(&state.db, &state.config.verification, &claims.sub, request)
            .await?;
    Ok(Json(response))
}
