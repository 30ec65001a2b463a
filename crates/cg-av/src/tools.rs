//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of the engine
//! executables (ffmpeg and ffprobe) and provides lookup methods for the rest
//! of the crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Configuration for a single external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    #[schema(value_type = Option<String>)]
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// For each known tool, if the [`cg_core::config::ToolsConfig`] supplies a
    /// custom path **and** that path exists, it is used directly.  Otherwise
    /// [`which::which`] is used to locate the tool in `PATH`.  Tools that are
    /// not found are silently omitted from the registry.
    pub fn discover(tools_config: &cg_core::config::ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        "Configured {name} path {} does not exist; searching PATH",
                        p.display()
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            if let Some(path) = resolved {
                tracing::debug!("Found {name} at {}", path.display());
                registry.insert(name, path);
            }
        }

        registry
    }

    /// Build a registry from explicit paths without searching `PATH`.
    pub fn from_paths(ffmpeg: impl Into<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        let mut registry = Self::default();
        registry.insert("ffmpeg", ffmpeg.into());
        if let Some(path) = ffprobe {
            registry.insert("ffprobe", path);
        }
        registry
    }

    fn insert(&mut self, name: &str, path: PathBuf) {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path,
            },
        );
    }

    /// Return a reference to the [`ToolConfig`] for the given tool, or an
    /// [`cg_core::Error::EngineUnavailable`] if the tool was not found during
    /// discovery.
    pub fn require(&self, name: &str) -> cg_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            cg_core::Error::EngineUnavailable(format!(
                "{name} not found; is it installed and in PATH?"
            ))
        })
    }

    /// Path to ffmpeg.
    pub fn ffmpeg(&self) -> cg_core::Result<&Path> {
        self.require("ffmpeg").map(|cfg| cfg.path.as_path())
    }

    /// Confirm the engine can actually be executed by running `ffmpeg -version`.
    ///
    /// # Errors
    ///
    /// [`cg_core::Error::EngineUnavailable`] when ffmpeg is missing, cannot be
    /// spawned, or exits nonzero.
    pub async fn ensure_engine(&self) -> cg_core::Result<()> {
        let path = self.ffmpeg()?;
        let output = ToolCommand::new(path.to_path_buf())
            .arg("-version")
            .execute()
            .await
            .map_err(|e| match e {
                unavailable @ cg_core::Error::EngineUnavailable(_) => unavailable,
                other => cg_core::Error::EngineUnavailable(other.to_string()),
            })?;

        if !output.success() {
            let diagnostic = output.diagnostic();
            return Err(cg_core::Error::EngineUnavailable(if diagnostic.is_empty() {
                format!("ffmpeg -version exited with code {}", output.code)
            } else {
                diagnostic
            }));
        }
        Ok(())
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| {
                if let Some(cfg) = self.tools.get(name) {
                    ToolInfo {
                        name: name.to_string(),
                        available: true,
                        version: detect_version(&cfg.path),
                        path: Some(cfg.path.clone()),
                    }
                } else {
                    ToolInfo {
                        name: name.to_string(),
                        available: false,
                        version: None,
                        path: None,
                    }
                }
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_core::config::ToolsConfig;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee any tool is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        let result = registry.require("ffprobe");
        assert!(matches!(result, Err(cg_core::Error::EngineUnavailable(_))));
    }

    #[test]
    fn check_all_returns_known_tools() {
        let registry = ToolRegistry::default();
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe"]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[test]
    fn from_paths_skips_path_search() {
        let registry = ToolRegistry::from_paths("/opt/ff/ffmpeg", None);
        assert_eq!(registry.ffmpeg().unwrap(), Path::new("/opt/ff/ffmpeg"));
        assert!(registry.require("ffprobe").is_err());
    }

    #[tokio::test]
    async fn ensure_engine_missing_binary() {
        let registry = ToolRegistry::from_paths("/nonexistent/ffmpeg-xyz", None);
        let err = registry.ensure_engine().await.unwrap_err();
        assert!(matches!(err, cg_core::Error::EngineUnavailable(_)));
        assert_eq!(err.http_status(), 503);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_engine_nonzero_exit() {
        let registry = ToolRegistry::from_paths("false", None);
        let err = registry.ensure_engine().await.unwrap_err();
        assert!(matches!(err, cg_core::Error::EngineUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ensure_engine_accepts_zero_exit() {
        let registry = ToolRegistry::from_paths("true", None);
        registry.ensure_engine().await.unwrap();
    }

    #[test]
    fn tool_config_serialization() {
        let cfg = ToolConfig {
            name: "ffmpeg".to_string(),
            path: PathBuf::from("/usr/bin/ffmpeg"),
        };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("ffmpeg"));
        let back: ToolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
