//! Job status and result route handlers.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use cg_core::events::JobSnapshot;
use cg_core::JobId;

use crate::context::AppContext;
use crate::error::AppError;

/// Parse a path segment into a [`JobId`]. Malformed ids are simply unknown.
pub(crate) fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse::<JobId>()
        .map_err(|_| AppError::from(cg_core::Error::job_not_found(raw)))
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job snapshot", body = JobSnapshot),
        (status = 404, description = "Unknown job"),
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, AppError> {
    let id = parse_job_id(&id)?;
    Ok(Json(ctx.jobs.snapshot(id)?))
}

/// GET /api/jobs/{id}/result
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/result",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "The finished GIF", body = Vec<u8>, content_type = "image/gif"),
        (status = 404, description = "Unknown job"),
        (status = 409, description = "Job still running or failed"),
    )
)]
pub async fn get_result(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_job_id(&id)?;
    let path = ctx.jobs.fetch_result(id)?;

    // The TTL task may have removed the artifact in the meantime.
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| cg_core::Error::job_not_found(id))?;
    let size = file.metadata().await.map_err(cg_core::Error::from)?.len();

    let body = Body::from_stream(ReaderStream::with_capacity(file, 64 * 1024));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), "image/gif".to_string()),
            (header::CONTENT_LENGTH.as_str(), size.to_string()),
            (
                header::CONTENT_DISPOSITION.as_str(),
                format!("attachment; filename=\"{id}.gif\""),
            ),
        ],
        body,
    )
        .into_response())
}
