pub mod health;
pub mod index;
pub mod info;

use axum::Router;
use utoipa::OpenApi;

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(index::router())
        .merge(health::router())
        .merge(info::router())
        .merge(crate::gateway::server::router())
        .fallback(not_found)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        info::info,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            health::HealthResponse,
            info::InfoResponse,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and connected-user count"),
        (name = "Info", description = "Configured limits"),
    )
)]
pub struct ApiDoc;
