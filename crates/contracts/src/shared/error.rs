use serde::{Deserialize, Serialize};

/// Error codes exchanged with clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    DeadlineExceeded,
    ResourceExhausted,
    Unavailable,
    Internal,
}

/// What a client should offer the user after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    FixInput,
    SignIn,
    Retry,
    WaitAndRetry,
    ResendCode,
    ContactSupport,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::DeadlineExceeded => "deadline-exceeded",
            ErrorCode::ResourceExhausted => "resource-exhausted",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::Internal => "internal",
        }
    }

    /// HTTP status used for this code
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::InvalidArgument | ErrorCode::FailedPrecondition => 400,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::AlreadyExists => 409,
            ErrorCode::ResourceExhausted => 429,
            ErrorCode::Internal => 500,
            ErrorCode::Unavailable => 503,
            ErrorCode::DeadlineExceeded => 504,
        }
    }

    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            ErrorCode::InvalidArgument | ErrorCode::AlreadyExists => RecoveryAction::FixInput,
            ErrorCode::Unauthenticated => RecoveryAction::SignIn,
            ErrorCode::PermissionDenied | ErrorCode::Internal => RecoveryAction::ContactSupport,
            ErrorCode::NotFound | ErrorCode::Unavailable => RecoveryAction::Retry,
            ErrorCode::FailedPrecondition | ErrorCode::ResourceExhausted => {
                RecoveryAction::WaitAndRetry
            }
            ErrorCode::DeadlineExceeded => RecoveryAction::ResendCode,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "Please check the information you entered.",
            ErrorCode::Unauthenticated => "Please sign in to continue.",
            ErrorCode::PermissionDenied => "You don't have permission to do that.",
            ErrorCode::NotFound => "We couldn't find what you were looking for.",
            ErrorCode::AlreadyExists => "This already exists.",
            ErrorCode::FailedPrecondition => "This action isn't possible right now.",
            ErrorCode::DeadlineExceeded => "Your code has expired. Request a new one.",
            ErrorCode::ResourceExhausted => "Too many attempts. Please wait and try again.",
            ErrorCode::Unavailable => "The service is temporarily unavailable.",
            ErrorCode::Internal => "Something went wrong on our side.",
        }
    }
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiErrorBody {
    pub fn recovery_action(&self) -> RecoveryAction {
        if self.retry_after.is_some() {
            return RecoveryAction::WaitAndRetry;
        }
        self.code.recovery_action()
    }
}
