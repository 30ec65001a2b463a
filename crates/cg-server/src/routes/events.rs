//! Server-Sent Events (SSE) handler for job progress.
//!
//! Each connection subscribes to one job. The first event is the current
//! status snapshot, followed by `progress` events and a single `done` or
//! `joberror` event, after which the stream closes.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};

use cg_core::events::JobEvent;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::jobs::parse_job_id;

/// GET /api/jobs/{id}/events -- SSE stream of one job's progress.
#[utoipa::path(
    get,
    path = "/api/jobs/{id}/events",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Event stream: status, progress, done, joberror", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Unknown job"),
    )
)]
pub async fn job_events(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let id = parse_job_id(&id)?;
    let events = ctx.jobs.subscribe(id)?;
    tracing::debug!(job_id = %id, "SSE subscriber attached");

    let stream = events.map(|event| Ok(to_sse(&event)));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

fn to_sse(event: &JobEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event.name()).data(data)
}
