//! Axum router construction.
//!
//! Builds the application router with the API routes, middleware layers,
//! the OpenAPI document, and optional static file serving.

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    info(title = "clipgif", description = "Video to animated GIF conversion"),
    paths(
        routes::convert::submit_conversion,
        routes::jobs::get_job,
        routes::jobs::get_result,
        routes::events::job_events,
        routes::health::health_check,
    ),
    components(schemas(
        routes::convert::SubmitResponse,
        routes::convert::ConvertForm,
        routes::health::HealthResponse,
        cg_core::events::JobSnapshot,
        cg_core::events::JobStatus,
        cg_core::events::ProgressEvent,
        cg_core::events::Phase,
        cg_av::ToolInfo,
    ))
)]
pub struct ApiDoc;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = ctx
        .config
        .server
        .max_upload_mb
        .saturating_mul(1024 * 1024);

    let api = Router::new()
        .route(
            "/convert",
            post(routes::convert::submit_conversion).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/jobs/{id}/events", get(routes::events::job_events))
        .route("/jobs/{id}/result", get(routes::jobs::get_result))
        .route("/health", get(routes::health::health_check))
        .route("/openapi.json", get(openapi_json));

    let mut app = Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for the browser front-end.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir).append_index_html_on_directories(true),
            );
        } else {
            tracing::warn!("Static directory {:?} does not exist; not serving files", dir);
        }
    }

    app
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_all_routes() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/convert",
            "/api/jobs/{id}",
            "/api/jobs/{id}/events",
            "/api/jobs/{id}/result",
            "/api/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
