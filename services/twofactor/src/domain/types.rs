use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Why an OTP was issued. Scopes both uniqueness (one active code per user
/// and purpose) and validity checks. Stored as its kebab-case tag so the
/// column stays readable and open to new purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Setup,
    Disable,
    BackupRegenerate,
    Login,
    EmailVerify,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Disable => "disable",
            Self::BackupRegenerate => "backup-generate",
            Self::Login => "login",
            Self::EmailVerify => "email-verify",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "setup" => Some(Self::Setup),
            "disable" => Some(Self::Disable),
            "backup-generate" => Some(Self::BackupRegenerate),
            "login" => Some(Self::Login),
            "email-verify" => Some(Self::EmailVerify),
            _ => None,
        }
    }
}

/// One-time passcode bound to a user and a purpose.
#[derive(Debug, Clone)]
pub struct OtpCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub purpose: OtpPurpose,
    pub expires_at: DateTime<Utc>,
    pub attempt_count: i32,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpCode {
    /// Valid iff unused, unexpired, and under the attempt cap.
    pub fn is_valid(&self, max_attempts: i32) -> bool {
        self.used_at.is_none()
            && self.expires_at > Utc::now()
            && self.attempt_count < max_attempts
    }
}

/// Digits in a generated OTP.
pub const OTP_CODE_LEN: usize = 6;

/// Single-use recovery code, stored only as an irreversible salted hash.
#[derive(Debug, Clone)]
pub struct BackupCode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Codes per generated batch.
pub const BACKUP_CODE_COUNT: usize = 8;

/// Characters per recovery code.
pub const BACKUP_CODE_LEN: usize = 8;

/// What an attempt-ledger row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    SendOtp,
    VerifyOtp,
}

impl AttemptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendOtp => "send-otp",
            Self::VerifyOtp => "verify-otp",
        }
    }
}

/// One append-only ledger row. `user_id` is absent for attempts made before
/// the account lookup succeeded; those are keyed by email instead.
#[derive(Debug, Clone)]
pub struct OtpAttempt {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip_address: String,
    pub kind: AttemptKind,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
}

/// Rate-limit key: a known account, or an email seen before account lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(Uuid),
    Email(String),
}

/// The 2FA-relevant projection of the user entity, which is owned by the
/// users service and reached through `UserPort`.
#[derive(Debug, Clone)]
pub struct TwoFactorUser {
    pub id: Uuid,
    pub email: String,
    /// `None` for accounts created through a federated identity provider;
    /// such accounts skip the password check entirely.
    pub password_hash: Option<String>,
    pub two_factor_enabled: bool,
    pub backup_codes_remaining: i32,
    pub two_factor_last_used: Option<DateTime<Utc>>,
}

/// Read-only status projection for the account-settings surface.
#[derive(Debug, Clone)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub backup_codes_remaining: i32,
    pub last_used: Option<DateTime<Utc>>,
}
