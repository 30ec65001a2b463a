//! Health check route handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use cg_av::ToolInfo;

use crate::context::AppContext;

/// Health response with engine availability.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    /// `ok` when ffmpeg is available, `degraded` otherwise.
    pub status: String,
    pub version: String,
    /// Jobs currently tracked (running or awaiting purge).
    pub jobs: usize,
    pub tools: Vec<ToolInfo>,
}

/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let tools = ctx.tools.clone();
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .unwrap_or_default();

    let engine_ok = infos.iter().any(|t| t.name == "ffmpeg" && t.available);

    Json(HealthResponse {
        status: if engine_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: ctx.jobs.len(),
        tools: infos,
    })
}
