//! Conversion request types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// LoopMode
// ---------------------------------------------------------------------------

/// GIF loop behavior, forwarded verbatim as the muxer's `-loop` count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LoopMode {
    /// `0`: loop forever.
    #[default]
    Forever,
    /// `1`: play, repeat once, stop.
    Once,
}

impl LoopMode {
    /// The value passed to the engine's `-loop` option.
    pub fn as_flag(self) -> u8 {
        match self {
            LoopMode::Forever => 0,
            LoopMode::Once => 1,
        }
    }
}

impl TryFrom<u8> for LoopMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LoopMode::Forever),
            1 => Ok(LoopMode::Once),
            other => Err(Error::Validation(format!(
                "loop must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl From<LoopMode> for u8 {
    fn from(mode: LoopMode) -> Self {
        mode.as_flag()
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_flag())
    }
}

// ---------------------------------------------------------------------------
// ConversionRequest
// ---------------------------------------------------------------------------

/// Everything needed to run one conversion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    input: PathBuf,
    output: PathBuf,
    width: u32,
    fps: u32,
    start: Option<String>,
    duration: Option<String>,
    overwrite: bool,
    loop_mode: LoopMode,
}

impl ConversionRequest {
    /// Create a request with the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `width` or `fps` is zero.
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        width: u32,
        fps: u32,
    ) -> Result<Self> {
        if width == 0 {
            return Err(Error::Validation("width must be greater than 0".into()));
        }
        if fps == 0 {
            return Err(Error::Validation("fps must be greater than 0".into()));
        }
        Ok(Self {
            input: input.into(),
            output: output.into(),
            width,
            fps,
            start: None,
            duration: None,
            overwrite: false,
            loop_mode: LoopMode::default(),
        })
    }

    /// Set the trim start (decimal seconds or `HH:MM:SS[.fff]`).
    #[must_use]
    pub fn with_start(mut self, start: Option<String>) -> Self {
        self.start = non_blank(start);
        self
    }

    /// Set the trim duration (decimal seconds or `HH:MM:SS[.fff]`).
    #[must_use]
    pub fn with_duration(mut self, duration: Option<String>) -> Self {
        self.duration = non_blank(duration);
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_loop_mode(mut self, loop_mode: LoopMode) -> Self {
        self.loop_mode = loop_mode;
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_rejected() {
        let err = ConversionRequest::new("in.mp4", "out.gif", 0, 10).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn zero_fps_rejected() {
        let err = ConversionRequest::new("in.mp4", "out.gif", 480, 0).unwrap_err();
        assert!(err.to_string().contains("fps"));
    }

    #[test]
    fn builder_sets_optional_fields() {
        let req = ConversionRequest::new("in.mp4", "out.gif", 320, 12)
            .unwrap()
            .with_start(Some("1.5".into()))
            .with_duration(Some("00:00:04".into()))
            .with_overwrite(true)
            .with_loop_mode(LoopMode::Once);
        assert_eq!(req.width(), 320);
        assert_eq!(req.fps(), 12);
        assert_eq!(req.start(), Some("1.5"));
        assert_eq!(req.duration(), Some("00:00:04"));
        assert!(req.overwrite());
        assert_eq!(req.loop_mode(), LoopMode::Once);
    }

    #[test]
    fn blank_trim_specs_are_dropped() {
        let req = ConversionRequest::new("in.mp4", "out.gif", 320, 12)
            .unwrap()
            .with_start(Some("   ".into()))
            .with_duration(Some(String::new()));
        assert_eq!(req.start(), None);
        assert_eq!(req.duration(), None);
    }

    #[test]
    fn loop_mode_from_u8() {
        assert_eq!(LoopMode::try_from(0).unwrap(), LoopMode::Forever);
        assert_eq!(LoopMode::try_from(1).unwrap(), LoopMode::Once);
        assert!(LoopMode::try_from(2).is_err());
        assert_eq!(LoopMode::Once.to_string(), "1");
    }

    #[test]
    fn loop_mode_serde_uses_integers() {
        assert_eq!(serde_json::to_string(&LoopMode::Forever).unwrap(), "0");
        let back: LoopMode = serde_json::from_str("1").unwrap();
        assert_eq!(back, LoopMode::Once);
        assert!(serde_json::from_str::<LoopMode>("7").is_err());
    }
}
