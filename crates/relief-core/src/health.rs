use axum::http::StatusCode;

/// `GET /healthz` — process liveness.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// `GET /readyz` — readiness. Services with external dependencies should
/// mount their own handler instead when they need a deeper check.
pub async fn readyz() -> StatusCode {
    StatusCode::OK
}
