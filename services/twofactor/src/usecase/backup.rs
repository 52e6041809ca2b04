use chrono::Utc;
use rand::RngExt;
use uuid::Uuid;

use crate::domain::repository::{BackupCodeRepository, SecretHasher, UserPort};
use crate::domain::types::{BACKUP_CODE_LEN, BackupCode};
use crate::error::TwoFactorError;

/// Charset for recovery codes (uppercase alphanumeric).
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..BACKUP_CODE_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Recovery channel independent of email access: a batch of single-use
/// codes, stored hashed, replaced wholesale on every regeneration.
pub struct BackupCodeEngine<B, U, H>
where
    B: BackupCodeRepository,
    U: UserPort,
    H: SecretHasher,
{
    pub backup_codes: B,
    pub users: U,
    pub hasher: H,
}

impl<B, U, H> BackupCodeEngine<B, U, H>
where
    B: BackupCodeRepository,
    U: UserPort,
    H: SecretHasher,
{
    /// Mint a fresh batch of `count` codes, replacing any previous batch.
    /// The plaintext codes are returned to the caller exactly once; only
    /// hashes are stored, so they can never be shown again.
    pub async fn generate(
        &self,
        user_id: Uuid,
        count: usize,
    ) -> Result<Vec<String>, TwoFactorError> {
        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(TwoFactorError::UserNotFound)?;

        let now = Utc::now();
        let mut plaintext = Vec::with_capacity(count);
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let code = generate_code();
            records.push(BackupCode {
                id: Uuid::new_v4(),
                user_id,
                code_hash: self.hasher.hash(&code)?,
                used_at: None,
                created_at: now,
            });
            plaintext.push(code);
        }

        self.backup_codes.replace_all(user_id, &records).await?;

        user.backup_codes_remaining = count as i32;
        self.users.update_two_factor(&user).await?;

        tracing::info!(user_id = %user_id, count = count, "backup code batch generated");
        Ok(plaintext)
    }

    /// Consume a presented recovery code. The stored form is an irreversible
    /// hash, so verification is a linear scan over the unused set, which is
    /// small by construction (one batch per user).
    pub async fn verify_and_use(
        &self,
        user_id: Uuid,
        presented: &str,
    ) -> Result<(), TwoFactorError> {
        let candidates = self.backup_codes.list_unused(user_id).await?;
        for candidate in &candidates {
            if !self.hasher.verify(presented, &candidate.code_hash)? {
                continue;
            }
            if !self.backup_codes.mark_used(candidate.id).await? {
                // Lost a race against another presentation of the same code.
                return Err(TwoFactorError::InvalidOrExpiredCode);
            }
            if let Some(mut user) = self.users.find_by_id(user_id).await? {
                user.backup_codes_remaining = (user.backup_codes_remaining - 1).max(0);
                self.users.update_two_factor(&user).await?;
            }
            tracing::info!(user_id = %user_id, "backup code consumed");
            return Ok(());
        }
        Err(TwoFactorError::InvalidOrExpiredCode)
    }

    /// Drop every code and zero the remaining counter (2FA disablement).
    pub async fn invalidate_all(&self, user_id: Uuid) -> Result<(), TwoFactorError> {
        self.backup_codes.delete_all(user_id).await?;
        if let Some(mut user) = self.users.find_by_id(user_id).await? {
            user.backup_codes_remaining = 0;
            self.users.update_two_factor(&user).await?;
        }
        Ok(())
    }
}
