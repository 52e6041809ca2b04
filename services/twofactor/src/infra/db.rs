use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use uuid::Uuid;

use relief_twofactor_schema::{backup_codes, otp_attempts, otp_codes};

use crate::domain::repository::{AttemptRepository, BackupCodeRepository, OtpCodeRepository};
use crate::domain::types::{AttemptKind, BackupCode, Identity, OtpAttempt, OtpCode, OtpPurpose};
use crate::error::TwoFactorError;

// ── OtpCode repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpCodeRepository {
    pub db: DatabaseConnection,
}

impl OtpCodeRepository for DbOtpCodeRepository {
    async fn find_by_user_and_purpose(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpCode>, TwoFactorError> {
        let model = otp_codes::Entity::find()
            .filter(otp_codes::Column::UserId.eq(user_id))
            .filter(otp_codes::Column::Purpose.eq(purpose.as_str()))
            .one(&self.db)
            .await
            .context("find otp code")?;
        match model {
            Some(model) => Ok(Some(otp_code_from_model(model)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, code: &OtpCode) -> Result<(), TwoFactorError> {
        otp_codes::ActiveModel {
            id: Set(code.id),
            user_id: Set(code.user_id),
            code: Set(code.code.clone()),
            purpose: Set(code.purpose.as_str().to_owned()),
            expires_at: Set(code.expires_at),
            attempt_count: Set(code.attempt_count),
            used_at: Set(code.used_at),
            created_at: Set(code.created_at),
        }
        .insert(&self.db)
        .await
        .context("insert otp code")?;
        Ok(())
    }

    async fn delete_by_user_and_purpose(
        &self,
        user_id: Uuid,
        purpose: OtpPurpose,
    ) -> Result<u64, TwoFactorError> {
        let result = otp_codes::Entity::delete_many()
            .filter(otp_codes::Column::UserId.eq(user_id))
            .filter(otp_codes::Column::Purpose.eq(purpose.as_str()))
            .exec(&self.db)
            .await
            .context("delete otp code by user and purpose")?;
        Ok(result.rows_affected)
    }

    async fn delete(&self, id: Uuid) -> Result<(), TwoFactorError> {
        otp_codes::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("delete otp code")?;
        Ok(())
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, TwoFactorError> {
        let result = otp_codes::Entity::delete_many()
            .filter(otp_codes::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .context("delete otp codes for user")?;
        Ok(result.rows_affected)
    }

    async fn increment_attempts(&self, id: Uuid) -> Result<(), TwoFactorError> {
        // Pushed down as `attempt_count = attempt_count + 1` so two racing
        // verifications cannot lose an increment.
        otp_codes::Entity::update_many()
            .col_expr(
                otp_codes::Column::AttemptCount,
                Expr::col(otp_codes::Column::AttemptCount).add(1),
            )
            .filter(otp_codes::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("increment otp attempts")?;
        Ok(())
    }

    async fn mark_used(&self, id: Uuid) -> Result<(), TwoFactorError> {
        let now = Utc::now();
        otp_codes::ActiveModel {
            id: Set(id),
            used_at: Set(Some(now)),
            ..Default::default()
        }
        .update(&self.db)
        .await
        .context("mark otp code used")?;
        Ok(())
    }
}

fn otp_code_from_model(model: otp_codes::Model) -> Result<OtpCode, TwoFactorError> {
    let purpose = OtpPurpose::parse(&model.purpose)
        .ok_or_else(|| anyhow::anyhow!("unknown otp purpose tag: {}", model.purpose))?;
    Ok(OtpCode {
        id: model.id,
        user_id: model.user_id,
        code: model.code,
        purpose,
        expires_at: model.expires_at,
        attempt_count: model.attempt_count,
        used_at: model.used_at,
        created_at: model.created_at,
    })
}

// ── BackupCode repository ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbBackupCodeRepository {
    pub db: DatabaseConnection,
}

impl BackupCodeRepository for DbBackupCodeRepository {
    async fn replace_all(
        &self,
        user_id: Uuid,
        codes: &[BackupCode],
    ) -> Result<(), TwoFactorError> {
        let models: Vec<backup_codes::ActiveModel> = codes
            .iter()
            .map(|code| backup_codes::ActiveModel {
                id: Set(code.id),
                user_id: Set(code.user_id),
                code_hash: Set(code.code_hash.clone()),
                used_at: Set(code.used_at),
                created_at: Set(code.created_at),
            })
            .collect();

        self.db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                Box::pin(async move {
                    backup_codes::Entity::delete_many()
                        .filter(backup_codes::Column::UserId.eq(user_id))
                        .exec(txn)
                        .await?;
                    backup_codes::Entity::insert_many(models).exec(txn).await?;
                    Ok(())
                })
            })
            .await
            .context("replace backup codes")?;
        Ok(())
    }

    async fn list_unused(&self, user_id: Uuid) -> Result<Vec<BackupCode>, TwoFactorError> {
        let models = backup_codes::Entity::find()
            .filter(backup_codes::Column::UserId.eq(user_id))
            .filter(backup_codes::Column::UsedAt.is_null())
            .all(&self.db)
            .await
            .context("list unused backup codes")?;
        Ok(models.into_iter().map(backup_code_from_model).collect())
    }

    async fn mark_used(&self, id: Uuid) -> Result<bool, TwoFactorError> {
        // Conditional on `used_at IS NULL` so a code consumed twice
        // concurrently is only honored once.
        let result = backup_codes::Entity::update_many()
            .col_expr(backup_codes::Column::UsedAt, Expr::value(Utc::now()))
            .filter(backup_codes::Column::Id.eq(id))
            .filter(backup_codes::Column::UsedAt.is_null())
            .exec(&self.db)
            .await
            .context("mark backup code used")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_all(&self, user_id: Uuid) -> Result<u64, TwoFactorError> {
        let result = backup_codes::Entity::delete_many()
            .filter(backup_codes::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .context("delete backup codes")?;
        Ok(result.rows_affected)
    }
}

fn backup_code_from_model(model: backup_codes::Model) -> BackupCode {
    BackupCode {
        id: model.id,
        user_id: model.user_id,
        code_hash: model.code_hash,
        used_at: model.used_at,
        created_at: model.created_at,
    }
}

// ── Attempt ledger repository ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbAttemptRepository {
    pub db: DatabaseConnection,
}

fn identity_filter(
    query: sea_orm::Select<otp_attempts::Entity>,
    identity: &Identity,
) -> sea_orm::Select<otp_attempts::Entity> {
    match identity {
        Identity::User(user_id) => query.filter(otp_attempts::Column::UserId.eq(*user_id)),
        Identity::Email(email) => query.filter(otp_attempts::Column::Email.eq(email.clone())),
    }
}

impl AttemptRepository for DbAttemptRepository {
    async fn record(&self, attempt: &OtpAttempt) -> Result<(), TwoFactorError> {
        otp_attempts::ActiveModel {
            id: Set(attempt.id),
            user_id: Set(attempt.user_id),
            email: Set(attempt.email.clone()),
            ip_address: Set(attempt.ip_address.clone()),
            kind: Set(attempt.kind.as_str().to_owned()),
            success: Set(attempt.success),
            attempted_at: Set(attempt.attempted_at),
        }
        .insert(&self.db)
        .await
        .context("record otp attempt")?;
        Ok(())
    }

    async fn count_for_identity(
        &self,
        identity: &Identity,
        kind: AttemptKind,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError> {
        let count = identity_filter(otp_attempts::Entity::find(), identity)
            .filter(otp_attempts::Column::Kind.eq(kind.as_str()))
            .filter(otp_attempts::Column::AttemptedAt.gt(since))
            .count(&self.db)
            .await
            .context("count attempts for identity")?;
        Ok(count)
    }

    async fn count_for_ip(
        &self,
        ip: &str,
        kind: Option<AttemptKind>,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError> {
        let mut query = otp_attempts::Entity::find()
            .filter(otp_attempts::Column::IpAddress.eq(ip))
            .filter(otp_attempts::Column::AttemptedAt.gt(since));
        if let Some(kind) = kind {
            query = query.filter(otp_attempts::Column::Kind.eq(kind.as_str()));
        }
        let count = query.count(&self.db).await.context("count attempts for ip")?;
        Ok(count)
    }

    async fn count_failed_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u64, TwoFactorError> {
        let count = otp_attempts::Entity::find()
            .filter(otp_attempts::Column::UserId.eq(user_id))
            .filter(otp_attempts::Column::Success.eq(false))
            .filter(otp_attempts::Column::AttemptedAt.gt(since))
            .count(&self.db)
            .await
            .context("count failed attempts for user")?;
        Ok(count)
    }

    async fn oldest_for_identity(
        &self,
        identity: &Identity,
        kind: AttemptKind,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TwoFactorError> {
        let model = identity_filter(otp_attempts::Entity::find(), identity)
            .filter(otp_attempts::Column::Kind.eq(kind.as_str()))
            .filter(otp_attempts::Column::AttemptedAt.gt(since))
            .order_by_asc(otp_attempts::Column::AttemptedAt)
            .one(&self.db)
            .await
            .context("find oldest attempt for identity")?;
        Ok(model.map(|m| m.attempted_at))
    }

    async fn latest_failure_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, TwoFactorError> {
        let model = otp_attempts::Entity::find()
            .filter(otp_attempts::Column::UserId.eq(user_id))
            .filter(otp_attempts::Column::Success.eq(false))
            .filter(otp_attempts::Column::AttemptedAt.gt(since))
            .order_by_desc(otp_attempts::Column::AttemptedAt)
            .one(&self.db)
            .await
            .context("find latest failed attempt for user")?;
        Ok(model.map(|m| m.attempted_at))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, TwoFactorError> {
        let result = otp_attempts::Entity::delete_many()
            .filter(otp_attempts::Column::AttemptedAt.lt(cutoff))
            .exec(&self.db)
            .await
            .context("delete old attempts")?;
        Ok(result.rows_affected)
    }
}
