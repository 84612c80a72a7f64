//! Media duration probing via ffprobe.
//!
//! Only the container-level duration field is requested. Probe failure is
//! non-fatal to callers: conversion proceeds with the unknown-progress
//! sentinel.

use std::path::Path;

use crate::error::AppError;

use super::discovery::ffprobe_path;
use super::path_to_string;
use super::runner::run_capture;

/// Total duration of the input in seconds.
pub fn probe_duration(path: &Path) -> Result<f64, AppError> {
    let ffprobe = ffprobe_path()?;

    log::debug!(
        target: "vidbatch::ffmpeg::ffprobe",
        "probing duration: {}",
        path.display()
    );

    let output = run_capture(
        &ffprobe,
        &[
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_to_string(path),
        ],
    )?;

    if !output.status.success() {
        return Err(AppError::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    parse_duration_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse the single-value ffprobe output into seconds.
pub(crate) fn parse_duration_output(raw: &str) -> Result<f64, AppError> {
    let trimmed = raw.trim();
    let seconds: f64 = trimmed.parse().map_err(|_| {
        AppError::ParseError(format!("duration output was not a number: {trimmed:?}"))
    })?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(AppError::ParseError(format!(
            "duration output was not a non-negative number: {trimmed:?}"
        )));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds() {
        assert_eq!(parse_duration_output("12.500000\n").unwrap(), 12.5);
        assert_eq!(parse_duration_output("0").unwrap(), 0.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_duration_output("N/A"),
            Err(AppError::ParseError(_))
        ));
        assert!(parse_duration_output("").is_err());
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(parse_duration_output("-3.0").is_err());
        assert!(parse_duration_output("inf").is_err());
        assert!(parse_duration_output("NaN").is_err());
    }
}
