//! Upload-and-convert route handler.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use cg_core::config::ConversionDefaults;
use cg_core::LoopMode;

use crate::context::AppContext;
use crate::error::AppError;
use crate::jobs::JobOptions;

/// Response for an accepted conversion.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Multipart form accepted by `POST /api/convert`. Documentation only.
#[allow(dead_code)]
#[derive(Deserialize, utoipa::ToSchema)]
pub struct ConvertForm {
    /// The video file.
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// Output width in pixels (never upscaled).
    width: Option<u32>,
    fps: Option<u32>,
    /// Trim start, seconds or `HH:MM:SS[.fff]`.
    start: Option<String>,
    /// Trim duration, seconds or `HH:MM:SS[.fff]`.
    duration: Option<String>,
    /// `0` loops forever, `1` plays once more.
    #[serde(rename = "loop")]
    loop_mode: Option<u8>,
}

/// Text fields collected from the form.
#[derive(Debug, Default)]
struct FormFields {
    width: Option<String>,
    fps: Option<String>,
    start: Option<String>,
    duration: Option<String>,
    loop_mode: Option<String>,
}

/// POST /api/convert
#[utoipa::path(
    post,
    path = "/api/convert",
    request_body(content = ConvertForm, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Conversion accepted", body = SubmitResponse),
        (status = 400, description = "Missing file or invalid field"),
        (status = 500, description = "Upload could not be stored"),
    )
)]
pub async fn submit_conversion(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload_dir = ctx.jobs.work_dir().join("uploads");
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(cg_core::Error::from)?;

    let mut upload: Option<PathBuf> = None;
    let mut fields = FormFields::default();

    let outcome = async {
        read_form(&mut multipart, &upload_dir, &mut upload, &mut fields).await?;
        let input = upload
            .clone()
            .ok_or_else(|| cg_core::Error::Validation("missing 'file' field".into()))?;
        let options = job_options(&ctx.config.defaults, fields)?;
        ctx.jobs.submit(input, options)
    }
    .await;

    match outcome {
        Ok(id) => Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                job_id: id.to_string(),
            }),
        )),
        Err(e) => {
            if let Some(path) = upload {
                let _ = tokio::fs::remove_file(&path).await;
            }
            Err(e.into())
        }
    }
}

async fn read_form(
    multipart: &mut Multipart,
    upload_dir: &Path,
    upload: &mut Option<PathBuf>,
    fields: &mut FormFields,
) -> cg_core::Result<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| cg_core::Error::Validation(format!("failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if upload.is_none() => {
                let path = upload_dir.join(upload_file_name(field.file_name()));
                // Recorded before writing so a partial file is cleaned up too.
                *upload = Some(path.clone());
                let size = save_field(field, &path).await?;
                if size == 0 {
                    return Err(cg_core::Error::Validation("uploaded file is empty".into()));
                }
                tracing::debug!(path = %path.display(), size_bytes = size, "Saved upload");
            }
            "width" => fields.width = Some(text(field).await?),
            "fps" => fields.fps = Some(text(field).await?),
            "start" => fields.start = Some(text(field).await?),
            "duration" => fields.duration = Some(text(field).await?),
            "loop" => fields.loop_mode = Some(text(field).await?),
            other => tracing::debug!("Ignoring form field {other:?}"),
        }
    }
    Ok(())
}

async fn text(field: Field<'_>) -> cg_core::Result<String> {
    field
        .text()
        .await
        .map_err(|e| cg_core::Error::Validation(format!("failed to read form field: {e}")))
}

async fn save_field(mut field: Field<'_>, path: &Path) -> cg_core::Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| cg_core::Error::Validation(format!("failed to read file chunk: {e}")))?
    {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(size)
}

/// Random name keeping a short alphanumeric extension from the client name.
fn upload_file_name(client_name: Option<&str>) -> String {
    let ext = client_name
        .and_then(|n| Path::new(n).extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{}.{ext}", uuid::Uuid::new_v4()),
        None => uuid::Uuid::new_v4().to_string(),
    }
}

fn job_options(defaults: &ConversionDefaults, fields: FormFields) -> cg_core::Result<JobOptions> {
    let mut options = JobOptions::from_defaults(defaults);
    options.remove_input = true;

    if let Some(width) = non_empty(fields.width) {
        options.width = parse_positive("width", &width)?;
    }
    if let Some(fps) = non_empty(fields.fps) {
        options.fps = parse_positive("fps", &fps)?;
    }
    if let Some(value) = non_empty(fields.loop_mode) {
        let flag: u8 = value
            .parse()
            .map_err(|_| cg_core::Error::Validation(format!("loop must be 0 or 1, got '{value}'")))?;
        options.loop_mode = LoopMode::try_from(flag)?;
    }
    options.start = non_empty(fields.start);
    options.duration = non_empty(fields.duration);
    Ok(options)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_positive(name: &str, value: &str) -> cg_core::Result<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            cg_core::Error::Validation(format!("{name} must be a positive integer, got '{value}'"))
        })
}
