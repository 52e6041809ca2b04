use sea_orm::DatabaseConnection;

use crate::infra::db::{DbAttemptRepository, DbBackupCodeRepository, DbOtpCodeRepository};
use crate::infra::email::SmtpMailer;
use crate::infra::grpc::GrpcUserPort;
use crate::infra::password::Argon2SecretHasher;
use crate::usecase::backup::BackupCodeEngine;
use crate::usecase::otp::{OtpConfig, OtpEngine};
use crate::usecase::rate_limit::{RateLimitConfig, RateLimiter};

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub mailer: SmtpMailer,
    pub user_port: GrpcUserPort,
    pub otp_config: OtpConfig,
    pub rate_limit_config: RateLimitConfig,
}

impl AppState {
    pub fn user_port(&self) -> GrpcUserPort {
        self.user_port.clone()
    }

    pub fn mailer(&self) -> SmtpMailer {
        self.mailer.clone()
    }

    pub fn hasher(&self) -> Argon2SecretHasher {
        Argon2SecretHasher
    }

    pub fn otp_code_repo(&self) -> DbOtpCodeRepository {
        DbOtpCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn backup_code_repo(&self) -> DbBackupCodeRepository {
        DbBackupCodeRepository {
            db: self.db.clone(),
        }
    }

    pub fn attempt_repo(&self) -> DbAttemptRepository {
        DbAttemptRepository {
            db: self.db.clone(),
        }
    }

    pub fn otp_engine(&self) -> OtpEngine<DbOtpCodeRepository, SmtpMailer> {
        OtpEngine {
            otp_codes: self.otp_code_repo(),
            mailer: self.mailer.clone(),
            config: self.otp_config.clone(),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter<DbAttemptRepository> {
        RateLimiter {
            attempts: self.attempt_repo(),
            config: self.rate_limit_config.clone(),
        }
    }

    pub fn backup_engine(
        &self,
    ) -> BackupCodeEngine<DbBackupCodeRepository, GrpcUserPort, Argon2SecretHasher> {
        BackupCodeEngine {
            backup_codes: self.backup_code_repo(),
            users: self.user_port(),
            hasher: Argon2SecretHasher,
        }
    }
}
