use sea_orm::Database;
use tracing::info;

use relief_core::tracing::init_tracing;
use relief_twofactor::config::TwoFactorConfig;
use relief_twofactor::infra::email::SmtpMailer;
use relief_twofactor::infra::grpc::GrpcUserPort;
use relief_twofactor::router::build_router;
use relief_twofactor::state::AppState;
use relief_twofactor::usecase::otp::OtpConfig;
use relief_twofactor::usecase::rate_limit::RateLimitConfig;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = TwoFactorConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let from = config.email_from.parse().expect("invalid EMAIL_FROM");
    let mailer = SmtpMailer::new(
        &config.smtp_host,
        config.smtp_port,
        config.smtp_username,
        config.smtp_password,
        from,
    )
    .expect("invalid SMTP configuration");

    let users_channel = tonic::transport::Channel::from_shared(config.users_grpc_url.clone())
        .expect("invalid USERS_GRPC_URL")
        .connect_lazy();

    let state = AppState {
        db,
        mailer,
        user_port: GrpcUserPort::new(users_channel),
        otp_config: OtpConfig::default(),
        rate_limit_config: RateLimitConfig::default(),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.twofactor_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("twofactor service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
