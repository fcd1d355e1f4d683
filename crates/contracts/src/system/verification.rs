use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rate_limit::RateLimitPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationType {
    PhoneVerification,
    PasswordReset,
}

impl VerificationType {
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        match self {
            VerificationType::PhoneVerification => RateLimitPolicy::SMS_VERIFICATION,
            VerificationType::PasswordReset => RateLimitPolicy::PASSWORD_RESET,
        }
    }
}

/// Arguments of the `sendVerificationCode` callable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeRequest {
    pub phone_number: String,
    #[serde(rename = "type")]
    pub kind: VerificationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendVerificationCodeResponse {
    pub success: bool,
    pub expires_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub phone_number: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub verified: bool,
}
