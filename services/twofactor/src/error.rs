use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Two-factor service error variants. Expected failures are values the
/// caller must handle; only storage and collaborator faults travel through
/// `Internal`.
#[derive(Debug, thiserror::Error)]
pub enum TwoFactorError {
    #[error("user not found")]
    UserNotFound,
    /// Absent, expired, exhausted, already-used, and plain-wrong codes all
    /// collapse here so a caller cannot probe which accounts or codes exist.
    #[error("invalid or expired code")]
    InvalidOrExpiredCode,
    #[error("invalid credentials")]
    InvalidPassword,
    #[error("too many attempts, retry later")]
    RateLimited { retry_after_secs: Option<i64> },
    #[error("account temporarily locked")]
    AccountLocked { retry_after_secs: Option<i64> },
    #[error("two-factor authentication is already enabled")]
    AlreadyEnabled,
    #[error("two-factor authentication is not enabled")]
    NotEnabled,
    #[error("a one-time passcode is required")]
    OtpRequired,
    #[error("could not deliver the passcode email")]
    EmailDeliveryFailed,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl TwoFactorError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidOrExpiredCode => "INVALID_OR_EXPIRED_CODE",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            Self::AlreadyEnabled => "ALREADY_ENABLED",
            Self::NotEnabled => "NOT_ENABLED",
            Self::OtpRequired => "OTP_REQUIRED",
            Self::EmailDeliveryFailed => "EMAIL_DELIVERY_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for TwoFactorError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::InvalidOrExpiredCode | Self::InvalidPassword => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } | Self::AccountLocked { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::AlreadyEnabled | Self::NotEnabled => StatusCode::CONFLICT,
            Self::OtpRequired => StatusCode::BAD_REQUEST,
            Self::EmailDeliveryFailed => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Log 500s only — tower-http TraceLayer already records method/uri/status for all
        // requests. 4xx are expected client errors; logging them here would be noise.
        // Internal errors need the anyhow chain logged so the root cause is traceable.
        if let Self::Internal(ref e) = self {
            tracing::error!(error = %e, kind = "INTERNAL", "internal error");
        }
        let retry_after_secs = match &self {
            Self::RateLimited { retry_after_secs }
            | Self::AccountLocked { retry_after_secs } => *retry_after_secs,
            _ => None,
        };
        let mut body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(secs) = retry_after_secs {
            body["retry_after_secs"] = secs.into();
        }
        (status, axum::Json(body)).into_response()
    }
}
