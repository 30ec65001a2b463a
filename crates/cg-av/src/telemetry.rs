//! Parser for ffmpeg `-progress` output.
//!
//! ffmpeg writes `key=value` lines and closes each block with a
//! `progress=continue` or `progress=end` line. A blank line also closes a
//! block. Lines without `=` are ignored.

/// `out_time_ms` values above this are assumed to be microseconds.
///
/// Some ffmpeg builds emit microseconds under the `out_time_ms` key. 60
/// million milliseconds is roughly 16.7 hours, longer than any clip this
/// tool is meant for.
pub const OUT_TIME_MS_MICROS_THRESHOLD: u64 = 60_000_000;

/// One completed block of `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryBlock {
    fields: Vec<(String, String)>,
}

impl TelemetryBlock {
    /// Last value recorded for `key` in this block.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Elapsed output time in milliseconds.
    ///
    /// Prefers `out_time_us`, then `out_time_ms` (rescaled when it is
    /// evidently microseconds), then the `HH:MM:SS.ffffff` `out_time`.
    /// Non-numeric values such as `N/A` are skipped.
    pub fn out_time_ms(&self) -> Option<u64> {
        if let Some(us) = self.get("out_time_us").and_then(parse_non_negative) {
            return Some(us / 1000);
        }
        if let Some(ms) = self.get("out_time_ms").and_then(parse_non_negative) {
            return Some(if ms > OUT_TIME_MS_MICROS_THRESHOLD {
                ms / 1000
            } else {
                ms
            });
        }
        self.get("out_time")
            .and_then(crate::timerange::parse_time_spec_ms)
    }
}

fn parse_non_negative(value: &str) -> Option<u64> {
    value.parse::<i64>().ok().and_then(|v| u64::try_from(v).ok())
}

/// Incremental line parser producing [`TelemetryBlock`]s.
#[derive(Debug, Default)]
pub struct TelemetryParser {
    current: Vec<(String, String)>,
}

impl TelemetryParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns a block when this line completes one.
    pub fn feed_line(&mut self, line: &str) -> Option<TelemetryBlock> {
        let line = line.trim();
        if line.is_empty() {
            return self.take_block();
        }

        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        self.current
            .push((key.to_string(), value.trim().to_string()));

        if key == "progress" {
            self.take_block()
        } else {
            None
        }
    }

    fn take_block(&mut self) -> Option<TelemetryBlock> {
        if self.current.is_empty() {
            return None;
        }
        Some(TelemetryBlock {
            fields: std::mem::take(&mut self.current),
        })
    }
}
