//! Progress and job event types.
//!
//! [`ProgressEvent`] is what the conversion pipeline produces; [`JobEvent`]
//! is what a job subscriber receives. Both serialize to the JSON carried in
//! SSE `data:` lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::JobId;

// ---------------------------------------------------------------------------
// Phase / ProgressEvent
// ---------------------------------------------------------------------------

/// Conversion phase reported alongside a percent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Palette generation (first engine invocation).
    Palette,
    /// Paletted encode (second engine invocation).
    Encode,
    /// Terminal success marker.
    Done,
}

/// Normalized conversion progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Overall progress in `0..=100`.
    pub percent: u8,
    /// Elapsed output time reported by the engine, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_time_ms: Option<u64>,
    /// Effective clip duration used as the percent denominator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ProgressEvent {
    /// A palette-phase event.
    pub fn palette(percent: u8) -> Self {
        Self {
            phase: Phase::Palette,
            percent: percent.min(100),
            out_time_ms: None,
            duration_ms: None,
        }
    }

    /// An encode-phase event.
    pub fn encode(percent: u8, out_time_ms: Option<u64>, duration_ms: Option<u64>) -> Self {
        Self {
            phase: Phase::Encode,
            percent: percent.min(100),
            out_time_ms,
            duration_ms,
        }
    }

    /// The terminal event of a successful conversion.
    pub fn done(duration_ms: Option<u64>) -> Self {
        Self {
            phase: Phase::Done,
            percent: 100,
            out_time_ms: None,
            duration_ms,
        }
    }
}

impl Default for ProgressEvent {
    fn default() -> Self {
        Self::palette(0)
    }
}

// ---------------------------------------------------------------------------
// Job status / snapshot
// ---------------------------------------------------------------------------

/// Lifecycle status of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Point-in-time view of a job, sent as the first event to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobSnapshot {
    #[schema(value_type = String)]
    pub id: JobId,
    pub status: JobStatus,
    pub progress: ProgressEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// An event delivered to a job subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobEvent {
    /// Current status snapshot; always the first event on a subscription.
    Status(Box<JobSnapshotEvent>),
    /// Intermediate progress.
    Progress(ProgressEvent),
    /// Terminal success.
    Done(ProgressEvent),
    /// Terminal failure.
    Error { message: String },
}

/// Wire shape of a [`JobEvent::Status`] payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshotEvent {
    pub status: JobStatus,
    #[serde(flatten)]
    pub progress: ProgressEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobEvent {
    /// Build a status event from a snapshot.
    pub fn status(snapshot: &JobSnapshot) -> Self {
        JobEvent::Status(Box::new(JobSnapshotEvent {
            status: snapshot.status,
            progress: snapshot.progress,
            error: snapshot.error.clone(),
        }))
    }

    /// SSE event name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Status(_) => "status",
            JobEvent::Progress(_) => "progress",
            JobEvent::Done(_) => "done",
            JobEvent::Error { .. } => "joberror",
        }
    }

    /// Whether this event ends a subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done(_) | JobEvent::Error { .. })
    }
}
