use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use relief_core::health::{healthz, readyz};
use relief_core::middleware::request_id_layer;

use crate::handlers::twofactor::{
    cleanup_attempts, disable_two_factor, finish_setup, regenerate_backup_codes, request_otp,
    start_setup, two_factor_enabled, two_factor_status, verify_challenge,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Setup
        .route("/2fa/setup", post(start_setup))
        .route("/2fa/setup", patch(finish_setup))
        // OTP issuance for the enabled-account flows
        .route("/2fa/otp", post(request_otp))
        // Disable
        .route("/2fa/disable", post(disable_two_factor))
        // Backup codes
        .route("/2fa/backup-codes", post(regenerate_backup_codes))
        // Login challenge
        .route("/2fa/challenge", patch(verify_challenge))
        // Status
        .route("/2fa/{user_id}", get(two_factor_status))
        .route("/2fa/{user_id}/enabled", get(two_factor_enabled))
        // Ledger retention, driven by the external scheduler
        .route("/internal/attempts/cleanup", post(cleanup_attempts))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
