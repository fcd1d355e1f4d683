use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use contracts::domain::a004_order::TransitionError;
use contracts::shared::error::{ApiErrorBody, ErrorCode};

/// Errors surfaced across the HTTP boundary. Everything unexpected collapses
/// into `Internal`, whose details are logged and never sent to the caller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    FailedPrecondition(String),
    #[error("too many requests, retry in {retry_after}s")]
    RateLimited { retry_after: u64 },
    #[error("{0}")]
    DeadlineExceeded(String),
    #[error("{0}")]
    ResourceExhausted(String),
    #[error("{0}")]
    Unavailable(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AppError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            AppError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            AppError::FailedPrecondition(_) | AppError::RateLimited { .. } => {
                ErrorCode::FailedPrecondition
            }
            AppError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            AppError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
            AppError::Unavailable(_) => ErrorCode::Unavailable,
            AppError::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            other => StatusCode::from_u16(other.code().http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn body(&self) -> ApiErrorBody {
        let message = match self {
            AppError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        let retry_after = match self {
            AppError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        ApiErrorBody {
            code: self.code(),
            message,
            retry_after,
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{} not found", what))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::FailedPrecondition(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!("Internal error: {:?}", err);
        }
        let status = self.status();
        let body = self.body();
        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
