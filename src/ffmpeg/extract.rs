//! Thumbnail and animated GIF extraction.
//!
//! GIF rendering is a two-pass flow: one invocation generates a shared
//! palette into a temp file, a second consumes it. The palette is removed
//! once the second invocation finishes, whether or not it succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AppError;

use super::builder::{build_gif_args, build_palette_args, build_thumbnail_args};
use super::discovery::ffmpeg_path;
use super::runner::run_capture;

/// Extract a single frame at `timestamp` (e.g. `00:01:30`) as an image.
pub fn create_thumbnail(input: &Path, output: &Path, timestamp: &str) -> Result<(), AppError> {
    log::debug!(
        target: "vidbatch::ffmpeg::extract",
        "thumbnail: {} @ {} -> {}",
        input.display(),
        timestamp,
        output.display()
    );
    run_tool(&build_thumbnail_args(input, output, timestamp))
}

/// Render an animated GIF from a clip of the source.
pub fn create_gif(
    input: &Path,
    output: &Path,
    start: &str,
    duration: f64,
    fps: u32,
    width: u32,
) -> Result<(), AppError> {
    let palette = palette_temp_path();
    log::debug!(
        target: "vidbatch::ffmpeg::extract",
        "gif: {} [{} +{}s] -> {} (palette {})",
        input.display(),
        start,
        duration,
        output.display(),
        palette.display()
    );
    render_gif(input, output, start, duration, fps, width, &palette, run_tool)
}

/// Two-pass rendering with the tool invocation injected so the flow is
/// testable without an encoder present.
#[allow(clippy::too_many_arguments)]
fn render_gif<F>(
    input: &Path,
    output: &Path,
    start: &str,
    duration: f64,
    fps: u32,
    width: u32,
    palette: &Path,
    mut run: F,
) -> Result<(), AppError>
where
    F: FnMut(&[String]) -> Result<(), AppError>,
{
    if let Err(e) = run(&build_palette_args(input, palette, start, duration, fps, width)) {
        let _ = fs::remove_file(palette);
        return Err(e);
    }
    let result = run(&build_gif_args(
        input, output, palette, start, duration, fps, width,
    ));
    let _ = fs::remove_file(palette);
    result
}

/// Unique palette path under the system temp dir. Uniqueness only; the
/// palette never outlives the rendering call.
fn palette_temp_path() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("vidbatch-palette-{}-{}.png", std::process::id(), n))
}

/// Run one ffmpeg invocation to completion, mapping a non-zero exit to a
/// command failure carrying the captured diagnostics.
fn run_tool(args: &[String]) -> Result<(), AppError> {
    let ffmpeg = ffmpeg_path()?;
    let output = run_capture(ffmpeg, args)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(AppError::CommandFailed {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
