//! # cg-av
//!
//! ffmpeg orchestration for clipgif.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe, and confirm the engine runs.
//! - **Command execution** ([`ToolCommand`]) -- async builder for running
//!   external processes, with optional `-progress` telemetry streaming.
//! - **Telemetry parsing** ([`telemetry`]) -- `key=value` progress blocks and
//!   the elapsed-time unit heuristic.
//! - **Time ranges** ([`timerange`]) -- start/duration parsing, duration
//!   probing and the shared trim window.
//! - **GIF conversion** ([`convert_to_gif`]) -- the two-pass
//!   palettegen/paletteuse pipeline.

pub mod command;
pub mod gif;
pub mod palette;
pub mod telemetry;
pub mod timerange;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use gif::{convert_to_gif, Stage};
pub use palette::PaletteFile;
pub use telemetry::{TelemetryBlock, TelemetryParser};
pub use timerange::{effective_duration_ms, parse_time_spec_ms, probe_duration_ms, TrimWindow};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
