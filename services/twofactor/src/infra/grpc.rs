use chrono::Utc;
use tonic::transport::Channel;
use uuid::Uuid;

use relief_proto::user::{
    GetUserRequest, UpdateTwoFactorStateRequest, user_service_client::UserServiceClient,
};

use crate::domain::repository::UserPort;
use crate::domain::types::TwoFactorUser;
use crate::error::TwoFactorError;

#[derive(Clone)]
pub struct GrpcUserPort {
    client: UserServiceClient<Channel>,
}

impl GrpcUserPort {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: UserServiceClient::new(channel),
        }
    }
}

impl UserPort for GrpcUserPort {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TwoFactorUser>, TwoFactorError> {
        let response = self
            .client
            .clone()
            .get_user(GetUserRequest {
                user_id: id.to_string(),
            })
            .await;
        match response {
            Ok(resp) => Ok(Some(resp.into_inner().try_into()?)),
            Err(status) if status.code() == tonic::Code::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!("gRPC get_user failed: {e}").into()),
        }
    }

    async fn update_two_factor(
        &self,
        user: &TwoFactorUser,
    ) -> Result<TwoFactorUser, TwoFactorError> {
        let request = UpdateTwoFactorStateRequest {
            user_id: user.id.to_string(),
            two_factor_enabled: user.two_factor_enabled,
            backup_codes_remaining: u32::try_from(user.backup_codes_remaining.max(0))
                .unwrap_or(0),
            two_factor_last_used: user
                .two_factor_last_used
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        };
        let response = self
            .client
            .clone()
            .update_two_factor_state(request)
            .await
            .map_err(|e| anyhow::anyhow!("gRPC update_two_factor_state failed: {e}"))?;
        response.into_inner().try_into()
    }
}

impl TryFrom<relief_proto::user::User> for TwoFactorUser {
    type Error = TwoFactorError;

    fn try_from(user: relief_proto::user::User) -> Result<Self, Self::Error> {
        let relief_proto::user::User {
            id,
            email,
            password_hash,
            two_factor_enabled,
            backup_codes_remaining,
            two_factor_last_used,
        } = user;

        let id = id
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid UUID from users service"))?;
        // Empty strings stand in for absent optionals on the wire.
        let password_hash = (!password_hash.is_empty()).then_some(password_hash);
        let two_factor_last_used = if two_factor_last_used.is_empty() {
            None
        } else {
            Some(
                chrono::DateTime::parse_from_rfc3339(&two_factor_last_used)
                    .map_err(|_| anyhow::anyhow!("invalid timestamp from users service"))?
                    .with_timezone(&Utc),
            )
        };
        let backup_codes_remaining = i32::try_from(backup_codes_remaining)
            .map_err(|_| anyhow::anyhow!("backup code count out of i32 range"))?;

        Ok(TwoFactorUser {
            id,
            email,
            password_hash,
            two_factor_enabled,
            backup_codes_remaining,
            two_factor_last_used,
        })
    }
}
