use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OtpAttempts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OtpAttempts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OtpAttempts::UserId).uuid())
                    .col(ColumnDef::new(OtpAttempts::Email).string())
                    .col(ColumnDef::new(OtpAttempts::IpAddress).string().not_null())
                    .col(ColumnDef::new(OtpAttempts::Kind).string().not_null())
                    .col(ColumnDef::new(OtpAttempts::Success).boolean().not_null())
                    .col(
                        ColumnDef::new(OtpAttempts::AttemptedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Every limiter decision filters on one of these three keys plus the
        // attempt timestamp, and retention cleanup scans by timestamp alone.
        manager
            .create_index(
                Index::create()
                    .table(OtpAttempts::Table)
                    .col(OtpAttempts::UserId)
                    .col(OtpAttempts::AttemptedAt)
                    .name("idx_otp_attempts_user_id_attempted_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpAttempts::Table)
                    .col(OtpAttempts::Email)
                    .col(OtpAttempts::AttemptedAt)
                    .name("idx_otp_attempts_email_attempted_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpAttempts::Table)
                    .col(OtpAttempts::IpAddress)
                    .col(OtpAttempts::AttemptedAt)
                    .name("idx_otp_attempts_ip_address_attempted_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(OtpAttempts::Table)
                    .col(OtpAttempts::AttemptedAt)
                    .name("idx_otp_attempts_attempted_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OtpAttempts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OtpAttempts {
    Table,
    Id,
    UserId,
    Email,
    IpAddress,
    Kind,
    Success,
    AttemptedAt,
}
