//! Phone verification codes.
//!
//! A code is six random digits. Only its SHA-256 digest is stored on the user
//! row, together with an expiry and a wrong-attempt counter.

use chrono::{DateTime, Duration, Utc};
use contracts::system::verification::{
    SendVerificationCodeRequest, SendVerificationCodeResponse, VerifyCodeRequest,
    VerifyCodeResponse,
};
use rand::Rng;
use sea_orm::DatabaseConnection;
use sha2::{Digest, Sha256};

use super::sms::SmsSender;
use crate::shared::config::VerificationConfig;
use crate::shared::error::{AppError, AppResult};
use crate::system::rate_limit::service as rate_limit;
use crate::system::users::repository as users;

pub const PURGE_BATCH: u64 = 500;

/// `+` followed by 2 to 15 digits, the first non-zero
pub fn is_valid_e164(phone_number: &str) -> bool {
    let Some(digits) = phone_number.strip_prefix('+') else {
        return false;
    };
    (2..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0')
}

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

pub fn hash_code(code: &str) -> String {
    format!("{:x}", Sha256::digest(code.as_bytes()))
}

/// Constant-time comparison of two hex digests
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

pub async fn send_code(
    db: &DatabaseConnection,
    sms: &dyn SmsSender,
    config: &VerificationConfig,
    user_id: &str,
    req: SendVerificationCodeRequest,
) -> AppResult<SendVerificationCodeResponse> {
    send_code_at(db, sms, config, user_id, req, Utc::now()).await
}

pub async fn send_code_at(
    db: &DatabaseConnection,
    sms: &dyn SmsSender,
    config: &VerificationConfig,
    user_id: &str,
    req: SendVerificationCodeRequest,
    now: DateTime<Utc>,
) -> AppResult<SendVerificationCodeResponse> {
    let phone = req.phone_number.trim();
    if !is_valid_e164(phone) {
        return Err(AppError::InvalidArgument(
            "Phone number must be in E.164 format, e.g. +15551234567".into(),
        ));
    }
    if users::get_by_id(db, user_id).await?.is_none() {
        return Err(AppError::not_found("User"));
    }

    let limit = rate_limit::enforce(db, user_id, &req.kind.rate_limit_policy()).await?;

    let code = generate_code();
    let expires_at = now + Duration::minutes(config.code_ttl_minutes);
    users::set_verification_code(db, user_id, phone, &hash_code(&code), expires_at).await?;

    let message = format!(
        "Your verification code is {}. It expires in {} minutes.",
        code, config.code_ttl_minutes
    );
    if let Err(e) = sms.send(phone, &message).await {
        tracing::error!("Failed to send verification SMS: {:#}", e);
        users::clear_verification_code(db, user_id, false).await?;
        return Err(AppError::Unavailable(
            "Could not send the verification code, try again later".into(),
        ));
    }

    Ok(SendVerificationCodeResponse {
        success: true,
        expires_at,
        attempts_remaining: limit.remaining,
    })
}

pub async fn verify_code(
    db: &DatabaseConnection,
    config: &VerificationConfig,
    user_id: &str,
    req: VerifyCodeRequest,
) -> AppResult<VerifyCodeResponse> {
    verify_code_at(db, config, user_id, req, Utc::now()).await
}

pub async fn verify_code_at(
    db: &DatabaseConnection,
    config: &VerificationConfig,
    user_id: &str,
    req: VerifyCodeRequest,
    now: DateTime<Utc>,
) -> AppResult<VerifyCodeResponse> {
    let state = users::get_verification_state(db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let (Some(code_hash), Some(expiry)) = (state.code_hash, state.expiry) else {
        return Err(AppError::NotFound("No verification code found".into()));
    };
    if state.phone.as_deref() != Some(req.phone_number.trim()) {
        return Err(AppError::NotFound(
            "No verification code found for this phone number".into(),
        ));
    }
    if expiry <= now {
        users::clear_verification_code(db, user_id, false).await?;
        return Err(AppError::DeadlineExceeded(
            "Verification code has expired".into(),
        ));
    }
    // Reserve the attempt before comparing.
    if !users::reserve_verification_attempt(db, user_id, config.max_attempts).await? {
        return Err(AppError::ResourceExhausted(
            "Too many failed attempts, request a new code".into(),
        ));
    }
    if !digests_match(&hash_code(req.code.trim()), &code_hash) {
        return Err(AppError::InvalidArgument("Invalid verification code".into()));
    }

    users::clear_verification_code(db, user_id, true).await?;
    tracing::info!("Phone verified for user {}", user_id);
    Ok(VerifyCodeResponse {
        success: true,
        verified: true,
    })
}

/// Clear expired codes, at most one batch per call
pub async fn purge_expired(db: &DatabaseConnection, now: DateTime<Utc>) -> anyhow::Result<u64> {
    let purged = users::purge_expired_codes(db, now, PURGE_BATCH).await?;
    if purged > 0 {
        tracing::info!("Purged {} expired verification codes", purged);
    }
    Ok(purged)
}
