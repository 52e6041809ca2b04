#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::{
    AttemptKind, BackupCode, Identity, OtpAttempt, OtpCode, OtpPurpose, TwoFactorUser,
};
use crate::error::TwoFactorError;

/// Port to the users service, which owns the user entity. Only the
/// 2FA-relevant projection crosses this boundary.
pub trait UserPort: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TwoFactorUser>, TwoFactorError>;

    /// Persist `two_factor_enabled`, `backup_codes_remaining`, and
    /// `two_factor_last_used`. Returns the stored projection.
    async fn update_two_factor(
        &self,
        user: &TwoFactorUser,
    ) -> Result<TwoFactorUser, TwoFactorError>;
}

/// Repository for one-time passcodes.
pub trait OtpCodeRepository: Send + Sync {
    /// The (at most one) code stored for a user and purpose.
    async fn find_by_user_and_purpose(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpCode>, TwoFactorError>;

    async fn insert(&self, code: &OtpCode) -> Result<(), TwoFactorError>;

    /// Remove the code for (user, purpose). Returns rows removed.
    async fn delete_by_user_and_purpose(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<u64, TwoFactorError>;

    /// Remove one code by id (dispatch rollback, attempt-cap purge).
    async fn delete(&self, id: Uuid) -> Result<(), TwoFactorError>;

    /// Remove every outstanding code for a user. Returns rows removed.
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, TwoFactorError>;

    async fn increment_attempts(&self, id: Uuid) -> Result<(), TwoFactorError>;

    /// Mark a code consumed (sets `used_at`).
    async fn mark_used(&self, id: Uuid) -> Result<(), TwoFactorError>;
}

/// Repository for hashed single-use recovery codes.
pub trait BackupCodeRepository: Send + Sync {
    /// Atomically drop any previous batch and store the new one.
    async fn replace_all(
        &self,
        user_id: Uuid,
        codes: &[BackupCode],
    ) -> Result<(), TwoFactorError>;

    async fn list_unused(&self, user_id: Uuid) -> Result<Vec<BackupCode>, TwoFactorError>;

    /// Consume one code. Returns `false` when it was already used.
    async fn mark_used(&self, id: Uuid) -> Result<bool, TwoFactorError>;

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, TwoFactorError>;
}

/// Append-only ledger of send/verify attempts, the rate limiter's only
/// input. Counts are recomputed from raw rows on every decision, so no
/// counter can drift out of sync with the event history.
pub trait AttemptRepository: Send + Sync {
    async fn record(&self, attempt: &OtpAttempt) -> Result<(), TwoFactorError>;

    /// Attempts of one kind for an identity strictly after the cutoff.
    async fn count_for_identity(
        &self,
        identity: &Identity,
        kind: AttemptKind,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError>;

    /// Attempts for an IP strictly after the cutoff; `kind: None` counts
    /// both kinds, successes and failures alike.
    async fn count_for_ip(
        &self,
        ip: &str,
        kind: Option<AttemptKind>,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError>;

    /// Failed attempts of any kind for a user strictly after the cutoff.
    async fn count_failed_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError>;

    /// Timestamp of the oldest attempt `count_for_identity` would count.
    async fn oldest_for_identity(
        &self,
        identity: &Identity,
        kind: AttemptKind,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TwoFactorError>;

    /// Timestamp of the most recent failed attempt for a user after the
    /// cutoff.
    async fn latest_failure_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TwoFactorError>;

    /// Retention cleanup. Returns rows removed.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, TwoFactorError>;
}

/// One-way salted hashing, shared by password verification and recovery-code
/// storage.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, TwoFactorError>;
    fn verify(&self, secret: &str, hash: &str) -> Result<bool, TwoFactorError>;
}

/// Outbound email. OTP dispatch failures are surfaced so the caller can roll
/// back the stored code; the enabled/disabled notices are best-effort.
pub trait MailerPort: Send + Sync {
    async fn send_otp_email(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), TwoFactorError>;

    async fn send_two_factor_enabled(&self, to: &str) -> Result<(), TwoFactorError>;

    async fn send_two_factor_disabled(&self, to: &str) -> Result<(), TwoFactorError>;
}
