//! Incremental parser for the FFmpeg `-progress` stream.
//!
//! The stream is one `key=value` fragment per line (`frame`, `fps`,
//! `bitrate`, `out_time_ms`, `speed`, `progress`, ...). Fragments accumulate
//! into a field map; every `out_time_ms` update folds the map into exactly
//! one snapshot. `out_time_ms` is in microseconds despite the name.

use std::collections::HashMap;

/// Sentinel percentage meaning "unknown/unavailable".
pub const UNKNOWN_PERCENT: i32 = -1;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// One normalized progress update. Ephemeral: produced and consumed per
/// update, never retained beyond the most recent one a consumer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// 0-100, or [`UNKNOWN_PERCENT`] when the duration is unknown.
    pub percent: i32,
    pub message: String,
    pub frame: Option<u64>,
    pub speed: Option<f64>,
    pub bitrate: Option<String>,
}

/// Folds streamed progress fragments into [`ProgressSnapshot`] values.
///
/// Percentages are monotonically non-decreasing across the life of one
/// parser; once constructed without a duration the sentinel never
/// transitions back to a numeric value.
pub struct ProgressParser {
    duration_secs: Option<f64>,
    fields: HashMap<String, String>,
    last_percent: i32,
}

impl ProgressParser {
    /// `duration_secs` of `None` (or a non-positive value) pins every
    /// snapshot to the unknown sentinel.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            fields: HashMap::new(),
            last_percent: 0,
        }
    }

    /// Feed one stream line. Returns a snapshot only for elapsed-time
    /// updates; every other fragment just updates the field map.
    pub fn feed(&mut self, line: &str) -> Option<ProgressSnapshot> {
        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        let value = value.trim();
        self.fields.insert(key.to_string(), value.to_string());

        if key != "out_time_ms" {
            return None;
        }

        let elapsed_us: i64 = value.parse().unwrap_or(0);
        let percent = self.compute_percent(elapsed_us);
        Some(ProgressSnapshot {
            percent,
            message: self.compose_message(),
            frame: self.fields.get("frame").and_then(|v| v.parse().ok()),
            speed: self
                .fields
                .get("speed")
                .and_then(|v| v.trim_end_matches('x').parse().ok()),
            bitrate: self.fields.get("bitrate").cloned(),
        })
    }

    fn compute_percent(&mut self, elapsed_us: i64) -> i32 {
        let Some(duration) = self.duration_secs else {
            return UNKNOWN_PERCENT;
        };
        let elapsed_secs = elapsed_us as f64 / MICROS_PER_SECOND;
        // Truncation, not rounding; clamped at both bounds so malformed
        // fragments cannot produce a negative or overshooting value.
        let percent = ((elapsed_secs / duration) * 100.0) as i32;
        self.last_percent = percent.clamp(0, 100).max(self.last_percent);
        self.last_percent
    }

    fn compose_message(&self) -> String {
        let mut parts = Vec::new();
        for key in ["frame", "fps", "bitrate", "speed"] {
            if let Some(value) = self.fields.get(key) {
                if !value.is_empty() && value != "N/A" {
                    parts.push(format!("{key}={value}"));
                }
            }
        }
        if parts.is_empty() {
            "encoding".to_string()
        } else {
            parts.join(" ")
        }
    }
}
