//! Unified error type for clipgif.
//!
//! Every crate funnels its failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`] and for the CLI to print a useful diagnostic.

use std::path::PathBuf;

/// Unified error type covering all failure modes in clipgif.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine could not be started or its version probe failed.
    #[error("ffmpeg is not available: {0}")]
    EngineUnavailable(String),

    /// The conversion input does not exist.
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// The conversion output already exists and overwrite was not requested.
    #[error("output file already exists: {} (use --overwrite to replace it)", .0.display())]
    OutputExists(PathBuf),

    /// An engine invocation exited with a nonzero status.
    #[error("ffmpeg failed: {output}\ncommand: {command}")]
    EngineExecution {
        /// Shell-safe reconstruction of the failing command line.
        command: String,
        /// Trimmed captured stderr (or stdout when stderr was empty).
        output: String,
    },

    /// No job with the given id is tracked.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job has not reached a terminal status yet.
    #[error("job not finished: {0}")]
    JobNotReady(String),

    /// The job ended in error; carries the stored message.
    #[error("job failed: {0}")]
    JobFailed(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::EngineUnavailable(_) => 503,
            Error::InputNotFound(_) => 400,
            Error::OutputExists(_) => 409,
            Error::EngineExecution { .. } => 502,
            Error::JobNotFound(_) => 404,
            Error::JobNotReady(_) => 409,
            Error::JobFailed(_) => 409,
            Error::Validation(_) => 400,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::EngineUnavailable(_) => "engine_unavailable",
            Error::InputNotFound(_) => "input_not_found",
            Error::OutputExists(_) => "output_exists",
            Error::EngineExecution { .. } => "engine_execution_error",
            Error::JobNotFound(_) => "job_not_found",
            Error::JobNotReady(_) => "job_not_ready",
            Error::JobFailed(_) => "job_failed",
            Error::Validation(_) => "validation_error",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::EngineExecution`].
    pub fn engine_execution(command: impl Into<String>, output: impl Into<String>) -> Self {
        Error::EngineExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Convenience constructor for [`Error::JobNotFound`].
    pub fn job_not_found(id: impl std::fmt::Display) -> Self {
        Error::JobNotFound(id.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
