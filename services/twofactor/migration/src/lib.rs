use sea_orm_migration::prelude::*;

mod m20260401_000001_create_otp_codes;
mod m20260401_000002_create_backup_codes;
mod m20260401_000003_create_otp_attempts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260401_000001_create_otp_codes::Migration),
            Box::new(m20260401_000002_create_backup_codes::Migration),
            Box::new(m20260401_000003_create_otp_attempts::Migration),
        ]
    }
}
