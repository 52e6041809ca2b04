use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::repository::AttemptRepository;
use crate::domain::types::{AttemptKind, Identity, OtpAttempt};
use crate::error::TwoFactorError;

/// Ceilings and windows for the sliding-window limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sliding window all send/verify ceilings are counted over.
    pub window: Duration,
    pub max_sends_per_identity: u64,
    pub max_sends_per_ip: u64,
    pub max_verifies_per_identity: u64,
    /// Window over which failed attempts accumulate toward a lockout.
    pub lockout_window: Duration,
    pub max_failed_attempts: u64,
    /// Default retention cutoff for ledger cleanup.
    pub retention: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::minutes(60),
            max_sends_per_identity: 3,
            max_sends_per_ip: 20,
            max_verifies_per_identity: 10,
            lockout_window: Duration::minutes(60),
            max_failed_attempts: 5,
            retention: Duration::hours(24),
        }
    }
}

/// Sliding-window limiter over the attempt ledger. Every decision is
/// recomputed from raw timestamped rows; there are no running counters to
/// drift out of sync, and state survives restarts because it lives in the
/// store. Storage errors propagate, which aborts the guarded operation:
/// the limiter fails closed.
pub struct RateLimiter<A: AttemptRepository> {
    pub attempts: A,
    pub config: RateLimitConfig,
}

impl<A: AttemptRepository> RateLimiter<A> {
    /// May a send proceed right now? False once the identity or IP ceiling
    /// is reached, or while the account is locked out.
    pub async fn can_send_otp(
        &self,
        identity: &Identity,
        ip: &str,
    ) -> Result<bool, TwoFactorError> {
        if let Identity::User(user_id) = identity {
            if self.is_account_locked(*user_id).await? {
                tracing::warn!(user_id = %user_id, "send denied: account locked");
                return Ok(false);
            }
        }

        let since = Utc::now() - self.config.window;
        let identity_sends = self
            .attempts
            .count_for_identity(identity, AttemptKind::SendOtp, since)
            .await?;
        if identity_sends >= self.config.max_sends_per_identity {
            tracing::warn!(?identity, count = identity_sends, "send denied: identity ceiling");
            return Ok(false);
        }

        let ip_sends = self
            .attempts
            .count_for_ip(ip, Some(AttemptKind::SendOtp), since)
            .await?;
        if ip_sends >= self.config.max_sends_per_ip {
            tracing::warn!(ip = %ip, count = ip_sends, "send denied: ip ceiling");
            return Ok(false);
        }

        Ok(true)
    }

    /// May a verification proceed right now?
    pub async fn can_verify_otp(
        &self,
        identity: &Identity,
        _ip: &str,
    ) -> Result<bool, TwoFactorError> {
        if let Identity::User(user_id) = identity {
            if self.is_account_locked(*user_id).await? {
                tracing::warn!(user_id = %user_id, "verify denied: account locked");
                return Ok(false);
            }
        }

        let since = Utc::now() - self.config.window;
        let identity_verifies = self
            .attempts
            .count_for_identity(identity, AttemptKind::VerifyOtp, since)
            .await?;
        if identity_verifies >= self.config.max_verifies_per_identity {
            tracing::warn!(?identity, count = identity_verifies, "verify denied: identity ceiling");
            return Ok(false);
        }

        Ok(true)
    }

    /// Append one ledger row. Never fails the caller: the ledger is the
    /// audit trail for an operation whose outcome is already decided, so a
    /// write error is logged and swallowed.
    pub async fn record_attempt(
        &self,
        user_id: Option<Uuid>,
        email: Option<&str>,
        ip: &str,
        kind: AttemptKind,
        success: bool,
    ) {
        let attempt = OtpAttempt {
            id: Uuid::new_v4(),
            user_id,
            email: email.map(str::to_owned),
            ip_address: ip.to_owned(),
            kind,
            success,
            attempted_at: Utc::now(),
        };
        if let Err(e) = self.attempts.record(&attempt).await {
            tracing::warn!(error = %e, kind = kind.as_str(), "failed to record otp attempt");
        }
    }

    /// True once the failed-attempt ceiling is reached within the lockout
    /// window. The boundary is strictly within-window: an attempt exactly
    /// `lockout_window` old no longer counts.
    pub async fn is_account_locked(&self, user_id: Uuid) -> Result<bool, TwoFactorError> {
        let since = Utc::now() - self.config.lockout_window;
        let failures = self.attempts.count_failed_for_user(user_id, since).await?;
        Ok(failures >= self.config.max_failed_attempts)
    }

    /// True once the IP has produced twice the normal send ceiling in total
    /// attempts (successes and failures, sends and verifies) in one window.
    pub async fn is_ip_blocked(&self, ip: &str) -> Result<bool, TwoFactorError> {
        let since = Utc::now() - self.config.window;
        let total = self.attempts.count_for_ip(ip, None, since).await?;
        let blocked = total >= self.config.max_sends_per_ip * 2;
        if blocked {
            tracing::warn!(ip = %ip, count = total, "ip hard-blocked");
        }
        Ok(blocked)
    }

    /// Time until the oldest counted send leaves the window, once the
    /// identity's send ceiling is reached. `None` while under the ceiling.
    pub async fn get_send_cooldown(
        &self,
        identity: &Identity,
    ) -> Result<Option<Duration>, TwoFactorError> {
        let now = Utc::now();
        let since = now - self.config.window;
        let sends = self
            .attempts
            .count_for_identity(identity, AttemptKind::SendOtp, since)
            .await?;
        if sends < self.config.max_sends_per_identity {
            return Ok(None);
        }
        let oldest = self
            .attempts
            .oldest_for_identity(identity, AttemptKind::SendOtp, since)
            .await?;
        Ok(oldest.map(|t| (t + self.config.window) - now))
    }

    /// Time until the most recent failure ages out of the lockout window,
    /// while the account is locked. `None` when not locked.
    pub async fn get_lockout_remaining(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Duration>, TwoFactorError> {
        if !self.is_account_locked(user_id).await? {
            return Ok(None);
        }
        let now = Utc::now();
        let since = now - self.config.lockout_window;
        let latest = self
            .attempts
            .latest_failure_for_user(user_id, since)
            .await?;
        Ok(latest.map(|t| (t + self.config.lockout_window) - now))
    }

    /// Retention cleanup, driven by an external scheduler. Not part of any
    /// real-time decision path.
    pub async fn cleanup_old_attempts(
        &self,
        older_than: Option<Duration>,
    ) -> Result<u64, TwoFactorError> {
        let cutoff = Utc::now() - older_than.unwrap_or(self.config.retention);
        let deleted = self.attempts.delete_older_than(cutoff).await?;
        tracing::info!(deleted = deleted, cutoff = %cutoff, "attempt ledger cleaned up");
        Ok(deleted)
    }
}
