//! Time range resolution for partial-clip conversions.
//!
//! Start and duration arrive as user-supplied strings. They are parsed into
//! milliseconds, combined with a probed media duration into the effective
//! clip length used as the encode-phase progress denominator, and rendered
//! into the `-ss`/`-t` arguments shared by both engine invocations.

use std::path::Path;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Parse a time specification into whole milliseconds.
///
/// Accepts bare non-negative decimal seconds (`"2.5"`) or
/// `HH:MM:SS[.fraction]` with minutes and seconds in `0..=59`. Fractions
/// beyond millisecond precision are truncated. Returns `None` for anything
/// else, including negative values.
pub fn parse_time_spec_ms(spec: &str) -> Option<u64> {
    let spec = spec.trim();
    if spec.is_empty() {
        return None;
    }

    if !spec.contains(':') {
        return decimal_seconds_ms(spec);
    }

    let mut parts = spec.split(':');
    let (hours, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let hours = parse_digits(hours)?;
    let minutes = parse_digits(minutes).filter(|m| *m <= 59)?;
    let seconds_ms = decimal_seconds_ms(seconds).filter(|ms| *ms < 60_000)?;

    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60)?
        .checked_mul(1000)?
        .checked_add(seconds_ms)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `"12.3456"` → 12345. Exact decimal arithmetic, no float rounding.
fn decimal_seconds_ms(s: &str) -> Option<u64> {
    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole = if whole.is_empty() { 0 } else { parse_digits(whole)? };
    let millis = fraction
        .bytes()
        .chain(std::iter::repeat(b'0'))
        .take(3)
        .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'));

    whole.checked_mul(1000)?.checked_add(millis)
}

/// Render milliseconds as engine seconds with millisecond precision.
pub fn format_seconds(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Combine the probed full duration with the requested trim.
///
/// An explicit duration always wins. Otherwise an unknown full duration
/// stays unknown; a start offset is subtracted, saturating at zero.
pub fn effective_duration_ms(
    full_ms: Option<u64>,
    start_ms: Option<u64>,
    explicit_ms: Option<u64>,
) -> Option<u64> {
    if explicit_ms.is_some() {
        return explicit_ms;
    }
    let full = full_ms?;
    Some(match start_ms {
        Some(start) => full.saturating_sub(start),
        None => full,
    })
}

/// Probe the container duration of `input` with ffprobe.
///
/// Never fails: a missing ffprobe, a nonzero exit, or an unusable value all
/// yield `None`.
pub async fn probe_duration_ms(tools: &ToolRegistry, input: &Path) -> Option<u64> {
    let ffprobe = match tools.require("ffprobe") {
        Ok(cfg) => cfg.path.clone(),
        Err(e) => {
            tracing::debug!("Skipping duration probe: {e}");
            return None;
        }
    };

    let output = ToolCommand::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(input.to_string_lossy())
        .execute()
        .await
        .map_err(|e| tracing::debug!("Duration probe failed to start: {e}"))
        .ok()?;

    if !output.success() {
        tracing::debug!(code = output.code, "Duration probe exited nonzero");
        return None;
    }

    let secs: f64 = output.stdout.lines().next()?.trim().parse().ok()?;
    if !secs.is_finite() || secs <= 0.0 {
        tracing::debug!("Duration probe returned unusable value {secs}");
        return None;
    }
    Some((secs * 1000.0).floor() as u64)
}

/// The resolved trim window shared by both engine invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimWindow {
    start_ms: Option<u64>,
    duration_ms: Option<u64>,
}

impl TrimWindow {
    /// Validate optional start/duration specs.
    ///
    /// # Errors
    ///
    /// [`cg_core::Error::Validation`] if a spec does not parse or the
    /// duration is zero.
    pub fn resolve(start: Option<&str>, duration: Option<&str>) -> cg_core::Result<Self> {
        let start_ms = start.map(|s| parse_spec("start", s)).transpose()?;
        let duration_ms = duration.map(|s| parse_spec("duration", s)).transpose()?;

        if duration_ms == Some(0) {
            return Err(cg_core::Error::Validation(
                "duration must be greater than 0".into(),
            ));
        }

        Ok(Self {
            start_ms,
            duration_ms,
        })
    }

    pub fn start_ms(&self) -> Option<u64> {
        self.start_ms
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Input options placed before `-i`.
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(4);
        if let Some(start) = self.start_ms {
            args.push("-ss".to_string());
            args.push(format_seconds(start));
        }
        if let Some(duration) = self.duration_ms {
            args.push("-t".to_string());
            args.push(format_seconds(duration));
        }
        args
    }
}

fn parse_spec(field: &str, spec: &str) -> cg_core::Result<u64> {
    parse_time_spec_ms(spec).ok_or_else(|| {
        cg_core::Error::Validation(format!(
            "invalid {field} '{spec}': expected seconds or HH:MM:SS[.fff]"
        ))
    })
}
