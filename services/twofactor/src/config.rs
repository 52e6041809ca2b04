/// Two-factor service configuration loaded from environment variables.
#[derive(Debug)]
pub struct TwoFactorConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Users service gRPC URL (e.g. "http://users:50051"). Env var: `USERS_GRPC_URL`.
    pub users_grpc_url: String,
    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP relay port (default 587). Env var: `SMTP_PORT`.
    pub smtp_port: u16,
    /// SMTP credentials.
    pub smtp_username: String,
    pub smtp_password: String,
    /// Sender mailbox (e.g. "Relief <no-reply@relief.example>"). Env var: `EMAIL_FROM`.
    pub email_from: String,
    /// TCP port to listen on (default 3114). Env var: `TWOFACTOR_PORT`.
    pub twofactor_port: u16,
}

impl TwoFactorConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            users_grpc_url: std::env::var("USERS_GRPC_URL").expect("USERS_GRPC_URL"),
            smtp_host: std::env::var("SMTP_HOST").expect("SMTP_HOST"),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").expect("SMTP_USERNAME"),
            smtp_password: std::env::var("SMTP_PASSWORD").expect("SMTP_PASSWORD"),
            email_from: std::env::var("EMAIL_FROM").expect("EMAIL_FROM"),
            twofactor_port: std::env::var("TWOFACTOR_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3114),
        }
    }
}
