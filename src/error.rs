//! Error taxonomy for the conversion engine.
//!
//! Fatal errors abort the current request (and, under fail-fast batching,
//! the rest of the queue). `DurationUnavailable` is the one non-fatal
//! variant: it degrades progress reporting to the unknown sentinel.

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The ffmpeg/ffprobe binary could not be resolved.
    #[error("{0}")]
    ExecutableNotFound(String),

    /// External tool exited non-zero. Carries the captured diagnostic text.
    #[error("encoder failed (code {code}): {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Duration probe failed. Progress for the request degrades to the
    /// unknown sentinel; conversion itself proceeds.
    #[error("could not determine media duration: {0}")]
    DurationUnavailable(String),

    #[error("unexpected tool output: {0}")]
    ParseError(String),

    /// Caller supplied an invalid request. Rejected before any process is
    /// spawned.
    #[error("invalid conversion request: {0}")]
    ValidationError(String),

    /// Conversion was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_carries_code_and_diagnostics() {
        let e = AppError::CommandFailed {
            code: 1,
            stderr: "Invalid data found when processing input".to_string(),
        };
        let text = e.to_string();
        assert!(text.contains("code 1"));
        assert!(text.contains("Invalid data"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::other("pipe closed");
        let e: AppError = io.into();
        assert!(matches!(e, AppError::Io(_)));
        assert_eq!(e.to_string(), "pipe closed");
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(AppError::Cancelled.to_string(), "cancelled");
    }
}
