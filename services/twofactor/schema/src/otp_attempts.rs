use sea_orm::entity::prelude::*;

/// Append-only ledger row for one OTP send or verify attempt. The rate
/// limiter recomputes its sliding-window counts from these rows; nothing
/// ever updates them, and only retention cleanup deletes them.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "otp_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub ip_address: String,
    pub kind: String,
    pub success: bool,
    pub attempted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
