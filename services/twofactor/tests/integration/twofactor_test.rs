use chrono::Duration;
use uuid::Uuid;

use relief_twofactor::domain::types::{AttemptKind, OtpAttempt, OtpPurpose, TwoFactorUser};
use relief_twofactor::error::TwoFactorError;
use relief_twofactor::usecase::backup::BackupCodeEngine;
use relief_twofactor::usecase::otp::{OtpConfig, OtpEngine};
use relief_twofactor::usecase::rate_limit::{RateLimitConfig, RateLimiter};
use relief_twofactor::usecase::twofactor::{
    DisableTwoFactorUseCase, IsEnabledUseCase, RegenerateBackupCodesUseCase, RequestOtpUseCase,
    SetupTwoFactorUseCase, TwoFactorStatusUseCase, VerifyChallengeUseCase, VerifySetupUseCase,
};

use crate::helpers::{
    FakeHasher, MockAttemptRepo, MockBackupCodeRepo, MockMailer, MockOtpCodeRepo, MockUserPort,
    TEST_IP, attempt_at, enabled_user, federated_user, test_user,
};

/// All mocks wired together the way `AppState` wires the real adapters.
struct World {
    users: MockUserPort,
    otp_repo: MockOtpCodeRepo,
    backup_repo: MockBackupCodeRepo,
    attempts: MockAttemptRepo,
    mailer: MockMailer,
}

impl World {
    fn new(users: Vec<TwoFactorUser>) -> Self {
        Self::build(users, MockAttemptRepo::empty(), MockMailer::new())
    }

    fn with_attempts(users: Vec<TwoFactorUser>, attempts: Vec<OtpAttempt>) -> Self {
        Self::build(users, MockAttemptRepo::new(attempts), MockMailer::new())
    }

    fn with_mailer(users: Vec<TwoFactorUser>, mailer: MockMailer) -> Self {
        Self::build(users, MockAttemptRepo::empty(), mailer)
    }

    fn build(users: Vec<TwoFactorUser>, attempts: MockAttemptRepo, mailer: MockMailer) -> Self {
        Self {
            users: MockUserPort::new(users),
            otp_repo: MockOtpCodeRepo::empty(),
            backup_repo: MockBackupCodeRepo::empty(),
            attempts,
            mailer,
        }
    }

    fn otp_engine(&self) -> OtpEngine<MockOtpCodeRepo, MockMailer> {
        OtpEngine {
            otp_codes: self.otp_repo.clone(),
            mailer: self.mailer.clone(),
            config: OtpConfig::default(),
        }
    }

    fn limiter(&self) -> RateLimiter<MockAttemptRepo> {
        RateLimiter {
            attempts: self.attempts.clone(),
            config: RateLimitConfig::default(),
        }
    }

    fn backup_engine(&self) -> BackupCodeEngine<MockBackupCodeRepo, MockUserPort, FakeHasher> {
        BackupCodeEngine {
            backup_codes: self.backup_repo.clone(),
            users: self.users.clone(),
            hasher: FakeHasher,
        }
    }

    fn setup(
        &self,
    ) -> SetupTwoFactorUseCase<MockUserPort, FakeHasher, MockOtpCodeRepo, MockMailer, MockAttemptRepo>
    {
        SetupTwoFactorUseCase {
            users: self.users.clone(),
            hasher: FakeHasher,
            otp: self.otp_engine(),
            limiter: self.limiter(),
        }
    }

    fn verify_setup(
        &self,
    ) -> VerifySetupUseCase<
        MockUserPort,
        FakeHasher,
        MockOtpCodeRepo,
        MockMailer,
        MockAttemptRepo,
        MockBackupCodeRepo,
    > {
        VerifySetupUseCase {
            users: self.users.clone(),
            otp: self.otp_engine(),
            limiter: self.limiter(),
            backup: self.backup_engine(),
            mailer: self.mailer.clone(),
        }
    }

    fn request_otp(
        &self,
    ) -> RequestOtpUseCase<MockUserPort, MockOtpCodeRepo, MockMailer, MockAttemptRepo> {
        RequestOtpUseCase {
            users: self.users.clone(),
            otp: self.otp_engine(),
            limiter: self.limiter(),
        }
    }

    fn disable(
        &self,
    ) -> DisableTwoFactorUseCase<
        MockUserPort,
        FakeHasher,
        MockOtpCodeRepo,
        MockMailer,
        MockAttemptRepo,
        MockBackupCodeRepo,
    > {
        DisableTwoFactorUseCase {
            users: self.users.clone(),
            hasher: FakeHasher,
            otp: self.otp_engine(),
            limiter: self.limiter(),
            backup: self.backup_engine(),
            mailer: self.mailer.clone(),
        }
    }

    fn regenerate(
        &self,
    ) -> RegenerateBackupCodesUseCase<
        MockUserPort,
        FakeHasher,
        MockOtpCodeRepo,
        MockMailer,
        MockAttemptRepo,
        MockBackupCodeRepo,
    > {
        RegenerateBackupCodesUseCase {
            users: self.users.clone(),
            hasher: FakeHasher,
            otp: self.otp_engine(),
            limiter: self.limiter(),
            backup: self.backup_engine(),
        }
    }

    fn challenge(
        &self,
    ) -> VerifyChallengeUseCase<
        MockUserPort,
        FakeHasher,
        MockOtpCodeRepo,
        MockMailer,
        MockAttemptRepo,
        MockBackupCodeRepo,
    > {
        VerifyChallengeUseCase {
            users: self.users.clone(),
            otp: self.otp_engine(),
            limiter: self.limiter(),
            backup: self.backup_engine(),
        }
    }
}

// ── Setup ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn setup_issues_a_setup_otp_and_records_the_send() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await
        .unwrap();

    assert!(world.mailer.last_code(OtpPurpose::Setup).is_some());
    let recorded = world.attempts.all();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind, AttemptKind::SendOtp);
    assert!(recorded[0].success);
    assert_eq!(recorded[0].user_id, Some(user.id));
}

#[tokio::test]
async fn setup_rejects_a_wrong_password() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .setup()
        .execute(user.id, Some("wrong"), TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::InvalidPassword)));
    assert!(world.otp_repo.all().is_empty());
}

#[tokio::test]
async fn setup_requires_a_password_for_password_accounts() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    let result = world.setup().execute(user.id, None, TEST_IP).await;
    assert!(matches!(result, Err(TwoFactorError::InvalidPassword)));
}

#[tokio::test]
async fn setup_skips_the_password_check_for_federated_accounts() {
    let user = federated_user();
    let world = World::new(vec![user.clone()]);

    world.setup().execute(user.id, None, TEST_IP).await.unwrap();
    assert!(world.mailer.last_code(OtpPurpose::Setup).is_some());
}

#[tokio::test]
async fn setup_rejects_an_already_enabled_account() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::AlreadyEnabled)));
}

#[tokio::test]
async fn setup_for_an_unknown_user_is_not_found() {
    let world = World::new(vec![]);

    let result = world
        .setup()
        .execute(Uuid::new_v4(), Some("hunter2"), TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::UserNotFound)));
}

#[tokio::test]
async fn fourth_send_in_the_window_is_rate_limited_with_a_cooldown() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);
    let setup = world.setup();

    for _ in 0..3 {
        setup
            .execute(user.id, Some("hunter2"), TEST_IP)
            .await
            .unwrap();
    }

    let result = setup.execute(user.id, Some("hunter2"), TEST_IP).await;
    match result {
        Err(TwoFactorError::RateLimited { retry_after_secs }) => {
            let secs = retry_after_secs.expect("cooldown expected at the ceiling");
            assert!(secs > 0 && secs <= 3600);
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn setup_is_denied_while_the_account_is_locked() {
    let user = test_user();
    let mut seeded = vec![];
    for _ in 0..5 {
        seeded.push(attempt_at(
            Some(user.id),
            TEST_IP,
            AttemptKind::VerifyOtp,
            false,
            Duration::minutes(10),
        ));
    }
    let world = World::with_attempts(vec![user.clone()], seeded);

    let result = world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await;
    assert!(matches!(
        result,
        Err(TwoFactorError::AccountLocked { retry_after_secs: Some(_) })
    ));
}

// ── Verify setup ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_setup_flow_enables_and_returns_backup_codes_once() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await
        .unwrap();
    let code = world.mailer.last_code(OtpPurpose::Setup).unwrap();

    let enabled = world
        .verify_setup()
        .execute(user.id, &code, TEST_IP)
        .await
        .unwrap();

    assert_eq!(enabled.backup_codes.len(), 8);
    let stored = world.users.get(user.id).unwrap();
    assert!(stored.two_factor_enabled);
    assert_eq!(stored.backup_codes_remaining, 8);
    assert_eq!(world.mailer.enabled_notices.lock().unwrap().len(), 1);

    let verifies: Vec<_> = world
        .attempts
        .all()
        .into_iter()
        .filter(|a| a.kind == AttemptKind::VerifyOtp)
        .collect();
    assert_eq!(verifies.len(), 1);
    assert!(verifies[0].success);
}

#[tokio::test]
async fn verify_setup_with_a_wrong_code_changes_nothing() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await
        .unwrap();

    let result = world
        .verify_setup()
        .execute(user.id, "000000", TEST_IP)
        .await;

    assert!(matches!(result, Err(TwoFactorError::InvalidOrExpiredCode)));
    let stored = world.users.get(user.id).unwrap();
    assert!(!stored.two_factor_enabled);
    assert_eq!(stored.backup_codes_remaining, 0);
    assert!(world.backup_repo.all().is_empty());

    let failures: Vec<_> = world
        .attempts
        .all()
        .into_iter()
        .filter(|a| a.kind == AttemptKind::VerifyOtp && !a.success)
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn verify_setup_survives_a_failed_enabled_notice() {
    let user = test_user();
    let world = World::with_mailer(vec![user.clone()], MockMailer::failing_notices());

    world
        .setup()
        .execute(user.id, Some("hunter2"), TEST_IP)
        .await
        .unwrap();
    let code = world.mailer.last_code(OtpPurpose::Setup).unwrap();

    // The state flip is persisted before the notice; a notice failure is
    // logged, not surfaced.
    world
        .verify_setup()
        .execute(user.id, &code, TEST_IP)
        .await
        .unwrap();
    assert!(world.users.get(user.id).unwrap().two_factor_enabled);
}

// ── Disable ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn disable_requires_an_otp_while_enabled() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .disable()
        .execute(user.id, Some("hunter2"), None, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::OtpRequired)));
    assert!(world.users.get(user.id).unwrap().two_factor_enabled);
}

#[tokio::test]
async fn disable_flow_clears_backup_codes_and_outstanding_otps() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);

    // Give the account a live backup batch and a spare login OTP.
    world.backup_engine().generate(user.id, 8).await.unwrap();
    world
        .request_otp()
        .execute(user.id, OtpPurpose::Login, TEST_IP)
        .await
        .unwrap();

    world
        .request_otp()
        .execute(user.id, OtpPurpose::Disable, TEST_IP)
        .await
        .unwrap();
    let code = world.mailer.last_code(OtpPurpose::Disable).unwrap();

    world
        .disable()
        .execute(user.id, Some("hunter2"), Some(&code), TEST_IP)
        .await
        .unwrap();

    let stored = world.users.get(user.id).unwrap();
    assert!(!stored.two_factor_enabled);
    assert_eq!(stored.backup_codes_remaining, 0);
    assert!(world.backup_repo.all().is_empty());
    assert!(world.otp_repo.all().is_empty(), "outstanding OTPs must be gone");
    assert_eq!(world.mailer.disabled_notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn disabling_twice_reports_a_precondition_failure_and_changes_nothing() {
    let mut user = test_user();
    user.two_factor_last_used = Some(chrono::Utc::now() - Duration::days(3));
    let world = World::new(vec![user.clone()]);

    let result = world
        .disable()
        .execute(user.id, Some("hunter2"), Some("482913"), TEST_IP)
        .await;

    assert!(matches!(result, Err(TwoFactorError::NotEnabled)));
    let stored = world.users.get(user.id).unwrap();
    assert_eq!(stored.backup_codes_remaining, user.backup_codes_remaining);
    assert_eq!(stored.two_factor_last_used, user.two_factor_last_used);
}

#[tokio::test]
async fn disable_with_a_wrong_otp_leaves_everything_intact() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    world.backup_engine().generate(user.id, 8).await.unwrap();

    world
        .request_otp()
        .execute(user.id, OtpPurpose::Disable, TEST_IP)
        .await
        .unwrap();

    let result = world
        .disable()
        .execute(user.id, Some("hunter2"), Some("000000"), TEST_IP)
        .await;

    assert!(matches!(result, Err(TwoFactorError::InvalidOrExpiredCode)));
    assert!(world.users.get(user.id).unwrap().two_factor_enabled);
    assert_eq!(world.backup_repo.all().len(), 8);
}

// ── Backup-code regeneration ──────────────────────────────────────────────────

#[tokio::test]
async fn regenerate_requires_two_factor_to_be_enabled() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .regenerate()
        .execute(user.id, Some("hunter2"), None, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::NotEnabled)));
}

#[tokio::test]
async fn regenerate_with_the_password_alone_replaces_the_batch() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    let old_batch = world.backup_engine().generate(user.id, 8).await.unwrap();

    let new_batch = world
        .regenerate()
        .execute(user.id, Some("hunter2"), None, TEST_IP)
        .await
        .unwrap();

    assert_eq!(new_batch.backup_codes.len(), 8);
    assert_ne!(old_batch, new_batch.backup_codes);
    let result = world
        .challenge()
        .execute(user.id, &old_batch[0], true, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::InvalidOrExpiredCode)));
}

#[tokio::test]
async fn regenerate_with_a_wrong_otp_keeps_the_old_batch() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    let old_batch = world.backup_engine().generate(user.id, 8).await.unwrap();

    world
        .request_otp()
        .execute(user.id, OtpPurpose::BackupRegenerate, TEST_IP)
        .await
        .unwrap();

    let result = world
        .regenerate()
        .execute(user.id, Some("hunter2"), Some("000000"), TEST_IP)
        .await;

    assert!(matches!(result, Err(TwoFactorError::InvalidOrExpiredCode)));
    // The old batch is still live.
    world
        .challenge()
        .execute(user.id, &old_batch[0], true, TEST_IP)
        .await
        .unwrap();
}

#[tokio::test]
async fn regenerate_with_the_right_otp_succeeds() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    world.backup_engine().generate(user.id, 8).await.unwrap();

    world
        .request_otp()
        .execute(user.id, OtpPurpose::BackupRegenerate, TEST_IP)
        .await
        .unwrap();
    let code = world.mailer.last_code(OtpPurpose::BackupRegenerate).unwrap();

    let batch = world
        .regenerate()
        .execute(user.id, Some("hunter2"), Some(&code), TEST_IP)
        .await
        .unwrap();
    assert_eq!(batch.backup_codes.len(), 8);
}

// ── Login challenge ───────────────────────────────────────────────────────────

#[tokio::test]
async fn challenge_with_the_login_otp_stamps_last_used() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    assert!(world.users.get(user.id).unwrap().two_factor_last_used.is_none());

    world
        .request_otp()
        .execute(user.id, OtpPurpose::Login, TEST_IP)
        .await
        .unwrap();
    let code = world.mailer.last_code(OtpPurpose::Login).unwrap();

    world
        .challenge()
        .execute(user.id, &code, false, TEST_IP)
        .await
        .unwrap();

    assert!(world.users.get(user.id).unwrap().two_factor_last_used.is_some());
}

#[tokio::test]
async fn challenge_with_a_backup_code_consumes_it() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    let codes = world.backup_engine().generate(user.id, 8).await.unwrap();

    world
        .challenge()
        .execute(user.id, &codes[0], true, TEST_IP)
        .await
        .unwrap();

    let stored = world.users.get(user.id).unwrap();
    assert_eq!(stored.backup_codes_remaining, 7);
    assert!(stored.two_factor_last_used.is_some());

    let again = world
        .challenge()
        .execute(user.id, &codes[0], true, TEST_IP)
        .await;
    assert!(matches!(again, Err(TwoFactorError::InvalidOrExpiredCode)));
}

#[tokio::test]
async fn challenge_requires_two_factor_to_be_enabled() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .challenge()
        .execute(user.id, "482913", false, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::NotEnabled)));
}

#[tokio::test]
async fn repeated_failed_challenges_lock_the_account() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);
    world
        .request_otp()
        .execute(user.id, OtpPurpose::Login, TEST_IP)
        .await
        .unwrap();

    for _ in 0..5 {
        let result = world
            .challenge()
            .execute(user.id, "000000", false, TEST_IP)
            .await;
        assert!(matches!(result, Err(TwoFactorError::InvalidOrExpiredCode)));
    }

    // The fifth failure crossed the lockout ceiling.
    let result = world
        .challenge()
        .execute(user.id, "000000", false, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::AccountLocked { .. })));
}

// ── Request OTP / projections ─────────────────────────────────────────────────

#[tokio::test]
async fn request_otp_requires_two_factor_to_be_enabled() {
    let user = test_user();
    let world = World::new(vec![user.clone()]);

    let result = world
        .request_otp()
        .execute(user.id, OtpPurpose::Disable, TEST_IP)
        .await;
    assert!(matches!(result, Err(TwoFactorError::NotEnabled)));
}

#[tokio::test]
async fn status_projects_the_two_factor_fields() {
    let user = enabled_user();
    let world = World::new(vec![user.clone()]);

    let status = TwoFactorStatusUseCase {
        users: world.users.clone(),
    }
    .execute(user.id)
    .await
    .unwrap();

    assert!(status.enabled);
    assert_eq!(status.backup_codes_remaining, 8);
    assert_eq!(status.last_used, user.two_factor_last_used);
}

#[tokio::test]
async fn status_for_an_unknown_user_is_not_found() {
    let world = World::new(vec![]);

    let result = TwoFactorStatusUseCase {
        users: world.users.clone(),
    }
    .execute(Uuid::new_v4())
    .await;
    assert!(matches!(result, Err(TwoFactorError::UserNotFound)));
}

#[tokio::test]
async fn is_enabled_reads_unknown_users_as_disabled() {
    let world = World::new(vec![enabled_user()]);
    let uc = IsEnabledUseCase {
        users: world.users.clone(),
    };

    assert!(uc.execute(enabled_user().id).await.unwrap());
    assert!(!uc.execute(Uuid::new_v4()).await.unwrap());
}
