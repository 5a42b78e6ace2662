//! Liveness and readiness endpoints.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse};
use sqlx::PgPool;
use tracing::error;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are reachable"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "tutoria"
)]
pub async fn health(pool: Extension<PgPool>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&*pool).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => {
            error!("Health check failed: {err}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/live",
    responses(
        (status = 200, description = "Process is up")
    ),
    tag = "tutoria"
)]
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
