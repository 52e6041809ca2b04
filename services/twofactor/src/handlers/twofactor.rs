use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::types::OtpPurpose;
use crate::error::TwoFactorError;
use crate::handlers::client_ip;
use crate::state::AppState;
use crate::usecase::twofactor::{
    DisableTwoFactorUseCase, IsEnabledUseCase, RegenerateBackupCodesUseCase, RequestOtpUseCase,
    SetupTwoFactorUseCase, TwoFactorStatusUseCase, VerifyChallengeUseCase, VerifySetupUseCase,
};

#[derive(Serialize)]
pub struct OtpIssuedResponse {
    pub expires_at: DateTime<Utc>,
}

// ── Setup ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SetupRequest {
    pub user_id: Uuid,
    pub current_password: Option<String>,
}

pub async fn start_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SetupRequest>,
) -> Result<(StatusCode, Json<OtpIssuedResponse>), TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = SetupTwoFactorUseCase {
        users: state.user_port(),
        hasher: state.hasher(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
    };
    let issued = uc
        .execute(body.user_id, body.current_password.as_deref(), &ip)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(OtpIssuedResponse {
            expires_at: issued.expires_at,
        }),
    ))
}

#[derive(Deserialize)]
pub struct VerifySetupRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

pub async fn finish_setup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifySetupRequest>,
) -> Result<Json<BackupCodesResponse>, TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = VerifySetupUseCase {
        users: state.user_port(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
        backup: state.backup_engine(),
        mailer: state.mailer(),
    };
    let enabled = uc.execute(body.user_id, &body.code, &ip).await?;
    Ok(Json(BackupCodesResponse {
        backup_codes: enabled.backup_codes,
    }))
}

// ── OTP request (disable / backup-generate / login) ───────────────────────────

/// Purposes a client may request a code for directly. Setup codes go through
/// the setup flow, which carries its own preconditions.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestablePurpose {
    Disable,
    BackupGenerate,
    Login,
}

impl From<RequestablePurpose> for OtpPurpose {
    fn from(purpose: RequestablePurpose) -> Self {
        match purpose {
            RequestablePurpose::Disable => OtpPurpose::Disable,
            RequestablePurpose::BackupGenerate => OtpPurpose::BackupRegenerate,
            RequestablePurpose::Login => OtpPurpose::Login,
        }
    }
}

#[derive(Deserialize)]
pub struct RequestOtpRequest {
    pub user_id: Uuid,
    pub purpose: RequestablePurpose,
}

pub async fn request_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestOtpRequest>,
) -> Result<(StatusCode, Json<OtpIssuedResponse>), TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = RequestOtpUseCase {
        users: state.user_port(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
    };
    let issued = uc.execute(body.user_id, body.purpose.into(), &ip).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(OtpIssuedResponse {
            expires_at: issued.expires_at,
        }),
    ))
}

// ── Disable ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DisableRequest {
    pub user_id: Uuid,
    pub current_password: Option<String>,
    pub code: Option<String>,
}

pub async fn disable_two_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DisableRequest>,
) -> Result<StatusCode, TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = DisableTwoFactorUseCase {
        users: state.user_port(),
        hasher: state.hasher(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
        backup: state.backup_engine(),
        mailer: state.mailer(),
    };
    uc.execute(
        body.user_id,
        body.current_password.as_deref(),
        body.code.as_deref(),
        &ip,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Backup codes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegenerateRequest {
    pub user_id: Uuid,
    pub current_password: Option<String>,
    pub code: Option<String>,
}

pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegenerateRequest>,
) -> Result<Json<BackupCodesResponse>, TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = RegenerateBackupCodesUseCase {
        users: state.user_port(),
        hasher: state.hasher(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
        backup: state.backup_engine(),
    };
    let regenerated = uc
        .execute(
            body.user_id,
            body.current_password.as_deref(),
            body.code.as_deref(),
            &ip,
        )
        .await?;
    Ok(Json(BackupCodesResponse {
        backup_codes: regenerated.backup_codes,
    }))
}

// ── Login challenge ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyChallengeRequest {
    pub user_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub use_backup_code: bool,
}

pub async fn verify_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyChallengeRequest>,
) -> Result<StatusCode, TwoFactorError> {
    let ip = client_ip(&headers);
    let uc = VerifyChallengeUseCase {
        users: state.user_port(),
        otp: state.otp_engine(),
        limiter: state.rate_limiter(),
        backup: state.backup_engine(),
    };
    uc.execute(body.user_id, &body.code, body.use_backup_code, &ip)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Status ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub backup_codes_remaining: i32,
    pub last_used: Option<DateTime<Utc>>,
}

pub async fn two_factor_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, TwoFactorError> {
    let uc = TwoFactorStatusUseCase {
        users: state.user_port(),
    };
    let status = uc.execute(user_id).await?;
    Ok(Json(StatusResponse {
        enabled: status.enabled,
        backup_codes_remaining: status.backup_codes_remaining,
        last_used: status.last_used,
    }))
}

#[derive(Serialize)]
pub struct EnabledResponse {
    pub enabled: bool,
}

pub async fn two_factor_enabled(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<EnabledResponse>, TwoFactorError> {
    let uc = IsEnabledUseCase {
        users: state.user_port(),
    };
    let enabled = uc.execute(user_id).await?;
    Ok(Json(EnabledResponse { enabled }))
}

// ── Ledger cleanup ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CleanupRequest {
    /// Override for the retention cutoff; defaults to the configured 24h.
    pub older_than_hours: Option<i64>,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

/// Invoked periodically by the external scheduler, never by the service
/// itself.
pub async fn cleanup_attempts(
    State(state): State<AppState>,
    Json(body): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, TwoFactorError> {
    let older_than = body.older_than_hours.map(Duration::hours);
    let deleted = state
        .rate_limiter()
        .cleanup_old_attempts(older_than)
        .await?;
    Ok(Json(CleanupResponse { deleted }))
}
