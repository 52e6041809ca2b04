use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use uuid::Uuid;

use crate::domain::repository::{MailerPort, OtpCodeRepository};
use crate::domain::types::{OtpCode, OtpPurpose};
use crate::error::TwoFactorError;

#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// How long an issued code stays verifiable.
    pub ttl: Duration,
    /// Verification tries allowed against a single code.
    pub max_attempts: i32,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(300),
            max_attempts: 5,
        }
    }
}

/// Generate a fixed-width numeric code. Sampling the whole integer range and
/// zero-padding keeps the distribution uniform over 000000–999999 instead of
/// biasing away from leading zeros.
fn generate_code() -> String {
    let mut rng = rand::rng();
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// Compare codes without short-circuiting so the comparison time does not
/// leak how many leading characters matched.
fn codes_match(given: &str, saved: &str) -> bool {
    let given = given.as_bytes();
    let saved = saved.as_bytes();
    if given.len() != saved.len() {
        return false;
    }
    given
        .iter()
        .zip(saved)
        .fold(0u8, |diff, (g, s)| diff | (g ^ s))
        == 0
}

/// Issues and verifies short-lived numeric codes bound to a user and a
/// purpose. Holds no state of its own; everything lives in the repository.
pub struct OtpEngine<O, M>
where
    O: OtpCodeRepository,
    M: MailerPort,
{
    pub otp_codes: O,
    pub mailer: M,
    pub config: OtpConfig,
}

impl<O, M> OtpEngine<O, M>
where
    O: OtpCodeRepository,
    M: MailerPort,
{
    /// Issue a fresh code for (user, purpose), replacing any previous one,
    /// and dispatch it by email. A failed dispatch removes the stored row
    /// again so no code the user can never receive is left behind.
    pub async fn send_otp(
        &self,
        user_id: Uuid,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<DateTime<Utc>, TwoFactorError> {
        self.otp_codes
            .delete_by_user_and_purpose(user_id, purpose)
            .await?;

        let now = Utc::now();
        let code = OtpCode {
            id: Uuid::new_v4(),
            user_id,
            code: generate_code(),
            purpose,
            expires_at: now + self.config.ttl,
            attempt_count: 0,
            used_at: None,
            created_at: now,
        };
        self.otp_codes.insert(&code).await?;

        if let Err(e) = self.mailer.send_otp_email(email, &code.code, purpose).await {
            tracing::warn!(
                user_id = %user_id,
                purpose = purpose.as_str(),
                error = %e,
                "otp dispatch failed, rolling back stored code"
            );
            self.otp_codes.delete(code.id).await?;
            return Err(TwoFactorError::EmailDeliveryFailed);
        }

        tracing::info!(
            user_id = %user_id,
            purpose = purpose.as_str(),
            expires_at = %code.expires_at,
            "otp issued"
        );
        Ok(code.expires_at)
    }

    /// Check a presented code. Absent, used, expired, attempt-capped, and
    /// mismatched codes all collapse into `InvalidOrExpiredCode`.
    ///
    /// Lookup is by (user, purpose): the single-active-code invariant makes
    /// the stored code unique per pair, and the attempt counter has to
    /// advance on mismatches too, which a lookup keyed on the presented code
    /// could never do.
    pub async fn verify_otp(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), TwoFactorError> {
        let Some(stored) = self
            .otp_codes
            .find_by_user_and_purpose(user_id, purpose)
            .await?
        else {
            return Err(TwoFactorError::InvalidOrExpiredCode);
        };

        if stored.used_at.is_some() || stored.expires_at <= Utc::now() {
            return Err(TwoFactorError::InvalidOrExpiredCode);
        }

        if stored.attempt_count >= self.config.max_attempts {
            // Exhausted codes are purged so the user has to request a new one.
            self.otp_codes.delete(stored.id).await?;
            return Err(TwoFactorError::InvalidOrExpiredCode);
        }

        // Counted before the comparison so a mismatch burns an attempt too.
        self.otp_codes.increment_attempts(stored.id).await?;

        if !codes_match(code, &stored.code) {
            return Err(TwoFactorError::InvalidOrExpiredCode);
        }

        self.otp_codes.mark_used(stored.id).await?;
        tracing::info!(user_id = %user_id, purpose = purpose.as_str(), "otp verified");
        Ok(())
    }

    /// Remove every outstanding code for the user. Returns rows removed.
    pub async fn invalidate_all(&self, user_id: Uuid) -> Result<u64, TwoFactorError> {
        self.otp_codes.delete_all_for_user(user_id).await
    }
}
