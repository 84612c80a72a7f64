//! Encoder process supervision.
//!
//! Spawns FFmpeg with the progress channel (stdout, `-progress pipe:1`) and
//! the diagnostic channel (stderr) captured separately. The calling thread
//! reads progress fragments; a background thread drains stderr so failures
//! can report complete diagnostics. Exactly one terminal outcome is
//! produced per run: a final 100% snapshot on success, or an error.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use parking_lot::Mutex;

use crate::error::AppError;

use super::discovery::ffmpeg_path;
use super::progress::{ProgressParser, ProgressSnapshot};

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Cooperative cancellation signal, checked between progress-fragment
/// reads. Cancelling kills the child process and yields a terminal outcome
/// distinct from failure.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run one conversion to completion, emitting a snapshot per elapsed-time
/// fragment. `duration_secs` of `None` pins progress to the unknown
/// sentinel.
pub fn run_encoder(
    args: Vec<String>,
    duration_secs: Option<f64>,
    cancel: Option<&CancelToken>,
    on_snapshot: impl FnMut(ProgressSnapshot),
) -> Result<(), AppError> {
    let ffmpeg = ffmpeg_path()?;
    run_program(ffmpeg, args, duration_secs, cancel, on_snapshot)
}

pub(crate) fn run_program(
    program: &Path,
    args: Vec<String>,
    duration_secs: Option<f64>,
    cancel: Option<&CancelToken>,
    mut on_snapshot: impl FnMut(ProgressSnapshot),
) -> Result<(), AppError> {
    log::debug!(
        target: "vidbatch::ffmpeg::runner",
        "spawning encoder: program={}, output={:?}",
        program.display(),
        args.last()
    );

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let stdout = match child.stdout.take() {
        Some(s) => s,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::other("failed to capture encoder stdout").into());
        }
    };
    let stderr = match child.stderr.take() {
        Some(s) => s,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::other("failed to capture encoder stderr").into());
        }
    };

    // Diagnostic channel drains concurrently into a bounded tail buffer.
    let stderr_buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let stderr_sink = Arc::clone(&stderr_buffer);
    let stderr_handle = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::with_capacity(256);
        while reader.read_until(b'\n', &mut line).unwrap_or(0) > 0 {
            let mut guard = stderr_sink.lock();
            guard.extend_from_slice(&line);
            if guard.len() > MAX_STDERR_BYTES {
                let excess = guard.len() - MAX_STDERR_BYTES;
                guard.drain(..excess);
            }
            line.clear();
        }
    });

    let mut parser = ProgressParser::new(duration_secs);
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if let Some(token) = cancel {
            if token.is_cancelled() {
                log::info!(
                    target: "vidbatch::ffmpeg::runner",
                    "cancellation requested, terminating encoder"
                );
                let _ = child.kill();
                let _ = child.wait();
                let _ = stderr_handle.join();
                return Err(AppError::Cancelled);
            }
        }
        if let Some(snapshot) = parser.feed(&line) {
            on_snapshot(snapshot);
        }
    }

    // Progress channel closed: wait for exit and finish draining stderr.
    let status = child.wait()?;
    let _ = stderr_handle.join();
    let stderr_text = String::from_utf8_lossy(&stderr_buffer.lock()).into_owned();

    if status.success() {
        log::info!(
            target: "vidbatch::ffmpeg::runner",
            "encoder completed successfully"
        );
        on_snapshot(final_snapshot(&stderr_text));
        Ok(())
    } else {
        let code = status.code().unwrap_or(-1);
        log::error!(
            target: "vidbatch::ffmpeg::runner",
            "encoder failed (code={}): {}",
            code,
            stderr_text.lines().next_back().unwrap_or("")
        );
        Err(AppError::CommandFailed {
            code,
            stderr: stderr_text,
        })
    }
}

/// The single success snapshot, enriched with the encoder's final stats
/// line when one was printed.
fn final_snapshot(stderr_text: &str) -> ProgressSnapshot {
    let stats = stderr_text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with("frame="));
    let message = match stats {
        Some(line) => format!("conversion complete ({line})"),
        None => "conversion complete".to_string(),
    };
    ProgressSnapshot {
        percent: 100,
        message,
        frame: None,
        speed: None,
        bitrate: None,
    }
}

fn spawn_error(program: &Path, e: std::io::Error) -> AppError {
    if e.kind() == std::io::ErrorKind::NotFound {
        AppError::ExecutableNotFound(format!("{} not found", program.display()))
    } else {
        AppError::Io(e)
    }
}

/// Run a tool invocation to completion capturing both channels. Used for
/// probing, encoder listing and single-shot extraction commands.
pub(crate) fn run_capture(program: &Path, args: &[String]) -> Result<Output, AppError> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(program, e))
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (&'static Path, Vec<String>) {
        (Path::new("/bin/sh"), vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn success_emits_monotonic_snapshots_and_final_complete() {
        let (program, args) = sh(
            "printf 'frame=10\\nout_time_ms=2500000\\nspeed=1.5x\\nout_time_ms=10000000\\n'; \
             echo 'frame=   10 fps= 30 Lsize=  100KiB speed=1.5x' >&2",
        );
        let mut snapshots = Vec::new();
        run_program(program, args, Some(10.0), None, |s| snapshots.push(s)).unwrap();

        let percents: Vec<i32> = snapshots.iter().map(|s| s.percent).collect();
        assert_eq!(percents, [25, 100, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        let last = snapshots.last().unwrap();
        assert_eq!(last.percent, 100);
        assert!(last.message.starts_with("conversion complete"));
        assert!(
            last.message.contains("Lsize"),
            "final message is enriched with the stats line: {}",
            last.message
        );
    }

    #[test]
    fn final_message_plain_without_stats_line() {
        let (program, args) = sh("printf 'out_time_ms=1000000\\n'");
        let mut snapshots = Vec::new();
        run_program(program, args, Some(1.0), None, |s| snapshots.push(s)).unwrap();
        assert_eq!(snapshots.last().unwrap().message, "conversion complete");
    }

    #[test]
    fn failure_carries_exit_code_and_drained_diagnostics() {
        let (program, args) = sh(
            "echo 'out_time_ms=1000000'; echo 'Invalid data found when processing input' >&2; exit 3",
        );
        let mut snapshots = Vec::new();
        let err = run_program(program, args, Some(10.0), None, |s| snapshots.push(s)).unwrap_err();
        match err {
            AppError::CommandFailed { code, stderr } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("Invalid data"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
        // No success snapshot after a failure.
        assert!(snapshots.iter().all(|s| s.percent < 100));
    }

    #[test]
    fn unknown_duration_keeps_sentinel_until_terminal() {
        let (program, args) = sh("printf 'out_time_ms=1000000\\nout_time_ms=2000000\\n'");
        let mut snapshots = Vec::new();
        run_program(program, args, None, None, |s| snapshots.push(s)).unwrap();
        let (last, rest) = snapshots.split_last().unwrap();
        assert!(rest.iter().all(|s| s.percent == -1));
        assert_eq!(last.percent, 100);
    }

    #[test]
    fn pre_cancelled_token_terminates_before_any_snapshot() {
        let token = CancelToken::new();
        token.cancel();
        let (program, args) = sh("echo 'out_time_ms=1000000'; sleep 5");
        let mut snapshots = Vec::new();
        let err =
            run_program(program, args, Some(10.0), Some(&token), |s| snapshots.push(s))
                .unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
        assert!(snapshots.is_empty());
    }

    #[test]
    fn missing_program_maps_to_executable_not_found() {
        let err = run_program(
            Path::new("/nonexistent/encoder-binary"),
            vec![],
            None,
            None,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ExecutableNotFound(_)));
    }
}
