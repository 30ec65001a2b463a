//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, external tools, job handling and conversion
//! defaults. Every section defaults sensibly so a completely empty `{}` file
//! is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::request::LoopMode;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tools: ToolsConfig,
    pub jobs: JobsConfig,
    pub defaults: ConversionDefaults,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path.
    ///
    /// Unlike [`Config::load_or_default`], a missing or malformed file is an
    /// error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.jobs.ttl_secs == 0 {
            warnings.push("jobs.ttl_secs is 0; results are purged as soon as they exist".into());
        }

        if self.jobs.max_concurrent == Some(0) {
            warnings.push("jobs.max_concurrent is 0; treating it as unbounded".into());
        }

        if self.defaults.width == 0 {
            warnings.push("defaults.width is 0; requests without a width will be rejected".into());
        }

        if self.defaults.fps == 0 {
            warnings.push("defaults.fps is 0; requests without an fps will be rejected".into());
        }

        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the browser front-end, served at `/`.
    pub static_dir: Option<PathBuf>,
    /// Maximum accepted upload size in megabytes.
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            static_dir: None,
            max_upload_mb: 512,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Asynchronous job handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Seconds after creation at which a job and its artifact are purged.
    pub ttl_secs: u64,
    /// Scratch directory for uploads and results. Defaults to a
    /// `clipgif` directory under the system temp dir.
    pub work_dir: Option<PathBuf>,
    /// Upper bound on conversions running at once. Unset means unbounded.
    pub max_concurrent: Option<usize>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            work_dir: None,
            max_concurrent: None,
        }
    }
}

impl JobsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Resolved scratch directory.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("clipgif"))
    }
}

/// Values used when a request omits a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionDefaults {
    pub width: u32,
    pub fps: u32,
    pub loop_mode: LoopMode,
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            width: 480,
            fps: 10,
            loop_mode: LoopMode::Forever,
        }
    }
}
