use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::repository::{
    AttemptRepository, BackupCodeRepository, MailerPort, OtpCodeRepository, SecretHasher,
    UserPort,
};
use crate::domain::types::{
    AttemptKind, BACKUP_CODE_COUNT, Identity, OtpPurpose, TwoFactorStatus, TwoFactorUser,
};
use crate::error::TwoFactorError;
use crate::usecase::backup::BackupCodeEngine;
use crate::usecase::otp::OtpEngine;
use crate::usecase::rate_limit::RateLimiter;

// ── Shared guards ─────────────────────────────────────────────────────────────

/// Verify the caller's password against the stored hash. Accounts from a
/// federated identity provider carry no hash and skip the check.
fn check_password<H: SecretHasher>(
    hasher: &H,
    user: &TwoFactorUser,
    password: Option<&str>,
) -> Result<(), TwoFactorError> {
    let Some(hash) = user.password_hash.as_deref() else {
        return Ok(());
    };
    let password = password.ok_or(TwoFactorError::InvalidPassword)?;
    if hasher.verify(password, hash)? {
        Ok(())
    } else {
        Err(TwoFactorError::InvalidPassword)
    }
}

/// Rate-limit gate ahead of an OTP send. Lockout beats the plain ceiling so
/// the caller learns how long to wait rather than just "try later".
async fn guard_send<A: AttemptRepository>(
    limiter: &RateLimiter<A>,
    user: &TwoFactorUser,
    ip: &str,
) -> Result<(), TwoFactorError> {
    if limiter.is_ip_blocked(ip).await? {
        return Err(TwoFactorError::RateLimited {
            retry_after_secs: None,
        });
    }
    if limiter.is_account_locked(user.id).await? {
        let remaining = limiter.get_lockout_remaining(user.id).await?;
        return Err(TwoFactorError::AccountLocked {
            retry_after_secs: remaining.map(|d| d.num_seconds()),
        });
    }
    let identity = Identity::User(user.id);
    if !limiter.can_send_otp(&identity, ip).await? {
        let cooldown = limiter.get_send_cooldown(&identity).await?;
        return Err(TwoFactorError::RateLimited {
            retry_after_secs: cooldown.map(|d| d.num_seconds()),
        });
    }
    Ok(())
}

/// Rate-limit gate ahead of an OTP or backup-code verification.
async fn guard_verify<A: AttemptRepository>(
    limiter: &RateLimiter<A>,
    user: &TwoFactorUser,
    ip: &str,
) -> Result<(), TwoFactorError> {
    if limiter.is_ip_blocked(ip).await? {
        return Err(TwoFactorError::RateLimited {
            retry_after_secs: None,
        });
    }
    if limiter.is_account_locked(user.id).await? {
        let remaining = limiter.get_lockout_remaining(user.id).await?;
        return Err(TwoFactorError::AccountLocked {
            retry_after_secs: remaining.map(|d| d.num_seconds()),
        });
    }
    if !limiter.can_verify_otp(&Identity::User(user.id), ip).await? {
        return Err(TwoFactorError::RateLimited {
            retry_after_secs: None,
        });
    }
    Ok(())
}

/// Stamp `two_factor_last_used` after a successful challenge. Best-effort:
/// failures are logged and swallowed so they never fail the login itself.
/// Refetches the user so the stamp never overwrites a counter another step
/// just updated.
pub async fn update_last_used<U: UserPort>(users: &U, user_id: Uuid) {
    let mut user = match users.find_by_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "could not load user for last-used stamp");
            return;
        }
    };
    user.two_factor_last_used = Some(Utc::now());
    if let Err(e) = users.update_two_factor(&user).await {
        tracing::warn!(user_id = %user_id, error = %e, "could not record two-factor usage time");
    }
}

// ── Setup (send setup OTP) ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct OtpIssued {
    pub expires_at: DateTime<Utc>,
}

pub struct SetupTwoFactorUseCase<U, H, O, M, A>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
{
    pub users: U,
    pub hasher: H,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
}

impl<U, H, O, M, A> SetupTwoFactorUseCase<U, H, O, M, A>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
{
    pub async fn execute(
        &self,
        user_id: Uuid,
        current_password: Option<&str>,
        ip: &str,
    ) -> Result<OtpIssued, TwoFactorError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;

        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled);
        }
        check_password(&self.hasher, &user, current_password)?;
        guard_send(&self.limiter, &user, ip).await?;

        let sent = self.otp.send_otp(user.id, &user.email, OtpPurpose::Setup).await;
        self.limiter
            .record_attempt(
                Some(user.id),
                Some(&user.email),
                ip,
                AttemptKind::SendOtp,
                sent.is_ok(),
            )
            .await;
        sent.map(|expires_at| OtpIssued { expires_at })
    }
}

// ── Verify setup (enable) ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TwoFactorEnabled {
    /// Shown to the user exactly once; only hashes survive.
    pub backup_codes: Vec<String>,
}

pub struct VerifySetupUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub users: U,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
    pub backup: BackupCodeEngine<B, U, H>,
    pub mailer: M,
}

impl<U, H, O, M, A, B> VerifySetupUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub async fn execute(
        &self,
        user_id: Uuid,
        code: &str,
        ip: &str,
    ) -> Result<TwoFactorEnabled, TwoFactorError> {
        // Verify paths report unknown users as invalid-code, not not-found,
        // so the endpoint cannot be used to enumerate accounts.
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::InvalidOrExpiredCode)?;

        if user.two_factor_enabled {
            return Err(TwoFactorError::AlreadyEnabled);
        }
        guard_verify(&self.limiter, &user, ip).await?;

        let verified = self.otp.verify_otp(user.id, code, OtpPurpose::Setup).await;
        self.limiter
            .record_attempt(
                Some(user.id),
                Some(&user.email),
                ip,
                AttemptKind::VerifyOtp,
                verified.is_ok(),
            )
            .await;
        verified?;

        // The state flip is persisted before anything best-effort happens, so
        // a failed notification can never leave persisted and observed state
        // disagreeing.
        user.two_factor_enabled = true;
        let user = self.users.update_two_factor(&user).await?;

        let backup_codes = self.backup.generate(user.id, BACKUP_CODE_COUNT).await?;

        if let Err(e) = self.mailer.send_two_factor_enabled(&user.email).await {
            tracing::warn!(user_id = %user.id, error = %e, "enabled notice failed");
        }

        tracing::info!(user_id = %user.id, "two-factor authentication enabled");
        Ok(TwoFactorEnabled { backup_codes })
    }
}

// ── Request OTP (disable / backup-generate / login) ───────────────────────────

pub struct RequestOtpUseCase<U, O, M, A>
where
    U: UserPort,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
{
    pub users: U,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
}

impl<U, O, M, A> RequestOtpUseCase<U, O, M, A>
where
    U: UserPort,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
{
    /// Issue an OTP for a flow that only exists while 2FA is on (disable,
    /// backup regeneration, login challenge).
    pub async fn execute(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
        ip: &str,
    ) -> Result<OtpIssued, TwoFactorError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;

        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled);
        }
        guard_send(&self.limiter, &user, ip).await?;

        let sent = self.otp.send_otp(user.id, &user.email, purpose).await;
        self.limiter
            .record_attempt(
                Some(user.id),
                Some(&user.email),
                ip,
                AttemptKind::SendOtp,
                sent.is_ok(),
            )
            .await;
        sent.map(|expires_at| OtpIssued { expires_at })
    }
}

// ── Disable ───────────────────────────────────────────────────────────────────

pub struct DisableTwoFactorUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub users: U,
    pub hasher: H,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
    pub backup: BackupCodeEngine<B, U, H>,
    pub mailer: M,
}

impl<U, H, O, M, A, B> DisableTwoFactorUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub async fn execute(
        &self,
        user_id: Uuid,
        current_password: Option<&str>,
        code: Option<&str>,
        ip: &str,
    ) -> Result<(), TwoFactorError> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;

        // Disabling twice reports a precondition failure and changes nothing.
        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled);
        }
        check_password(&self.hasher, &user, current_password)?;

        // While 2FA is on, turning it off demands a fresh disable-purpose OTP.
        let code = code.ok_or(TwoFactorError::OtpRequired)?;
        guard_verify(&self.limiter, &user, ip).await?;

        let verified = self.otp.verify_otp(user.id, code, OtpPurpose::Disable).await;
        self.limiter
            .record_attempt(
                Some(user.id),
                Some(&user.email),
                ip,
                AttemptKind::VerifyOtp,
                verified.is_ok(),
            )
            .await;
        verified?;

        user.two_factor_enabled = false;
        let user = self.users.update_two_factor(&user).await?;

        self.backup.invalidate_all(user.id).await?;
        let removed = self.otp.invalidate_all(user.id).await?;

        if let Err(e) = self.mailer.send_two_factor_disabled(&user.email).await {
            tracing::warn!(user_id = %user.id, error = %e, "disabled notice failed");
        }

        tracing::info!(user_id = %user.id, removed_otps = removed, "two-factor authentication disabled");
        Ok(())
    }
}

// ── Regenerate backup codes ───────────────────────────────────────────────────

pub struct RegenerateBackupCodesUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub users: U,
    pub hasher: H,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
    pub backup: BackupCodeEngine<B, U, H>,
}

impl<U, H, O, M, A, B> RegenerateBackupCodesUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub async fn execute(
        &self,
        user_id: Uuid,
        current_password: Option<&str>,
        code: Option<&str>,
        ip: &str,
    ) -> Result<TwoFactorEnabled, TwoFactorError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;

        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled);
        }
        check_password(&self.hasher, &user, current_password)?;

        // The OTP step is optional here: the password alone authorizes the
        // regeneration, but a supplied code must still be the real one.
        if let Some(code) = code {
            guard_verify(&self.limiter, &user, ip).await?;
            let verified = self
                .otp
                .verify_otp(user.id, code, OtpPurpose::BackupRegenerate)
                .await;
            self.limiter
                .record_attempt(
                    Some(user.id),
                    Some(&user.email),
                    ip,
                    AttemptKind::VerifyOtp,
                    verified.is_ok(),
                )
                .await;
            verified?;
        }

        let backup_codes = self.backup.generate(user.id, BACKUP_CODE_COUNT).await?;
        Ok(TwoFactorEnabled { backup_codes })
    }
}

// ── Login challenge ───────────────────────────────────────────────────────────

pub struct VerifyChallengeUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    pub users: U,
    pub otp: OtpEngine<O, M>,
    pub limiter: RateLimiter<A>,
    pub backup: BackupCodeEngine<B, U, H>,
}

impl<U, H, O, M, A, B> VerifyChallengeUseCase<U, H, O, M, A, B>
where
    U: UserPort,
    H: SecretHasher,
    O: OtpCodeRepository,
    M: MailerPort,
    A: AttemptRepository,
    B: BackupCodeRepository,
{
    /// Resolve a login-time challenge with either the login OTP or a backup
    /// code. A success stamps `two_factor_last_used` best-effort.
    pub async fn execute(
        &self,
        user_id: Uuid,
        code: &str,
        use_backup_code: bool,
        ip: &str,
    ) -> Result<(), TwoFactorError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::InvalidOrExpiredCode)?;

        if !user.two_factor_enabled {
            return Err(TwoFactorError::NotEnabled);
        }
        guard_verify(&self.limiter, &user, ip).await?;

        let verified = if use_backup_code {
            self.backup.verify_and_use(user.id, code).await
        } else {
            self.otp.verify_otp(user.id, code, OtpPurpose::Login).await
        };
        self.limiter
            .record_attempt(
                Some(user.id),
                Some(&user.email),
                ip,
                AttemptKind::VerifyOtp,
                verified.is_ok(),
            )
            .await;
        verified?;

        update_last_used(&self.users, user.id).await;
        Ok(())
    }
}

// ── Read-only projections ─────────────────────────────────────────────────────

pub struct TwoFactorStatusUseCase<U: UserPort> {
    pub users: U,
}

impl<U: UserPort> TwoFactorStatusUseCase<U> {
    pub async fn execute(&self, user_id: Uuid) -> Result<TwoFactorStatus, TwoFactorError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;
        Ok(TwoFactorStatus {
            enabled: user.two_factor_enabled,
            backup_codes_remaining: user.backup_codes_remaining,
            last_used: user.two_factor_last_used,
        })
    }
}

pub struct IsEnabledUseCase<U: UserPort> {
    pub users: U,
}

impl<U: UserPort> IsEnabledUseCase<U> {
    /// Unknown users read as disabled so the login flow cannot probe for
    /// account existence through this check.
    pub async fn execute(&self, user_id: Uuid) -> Result<bool, TwoFactorError> {
        let user = self.users.find_by_id(user_id).await?;
        Ok(user.is_some_and(|u| u.two_factor_enabled))
    }
}
