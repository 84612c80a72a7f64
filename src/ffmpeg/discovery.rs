//! FFmpeg/ffprobe binary resolution.
//!
//! Resolution order: `FFMPEG_PATH` env override, common install paths,
//! then a PATH lookup. The resolved path is cached for the process
//! lifetime. ffprobe is resolved as a sibling of the ffmpeg binary
//! (the two ship together).

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::AppError;

#[cfg(target_os = "windows")]
fn find_in_path() -> Option<PathBuf> {
    let output = Command::new("where").arg("ffmpeg").output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

#[cfg(not(target_os = "windows"))]
fn find_in_path() -> Option<PathBuf> {
    let output = Command::new("which").arg("ffmpeg").output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

static FFMPEG_PATH_CACHE: OnceLock<PathBuf> = OnceLock::new();

fn resolve_ffmpeg_path() -> Result<PathBuf, AppError> {
    // Common paths first to avoid spawning which/where.
    for path in common_paths() {
        if path.exists() {
            log::debug!(
                target: "vidbatch::ffmpeg::discovery",
                "FFmpeg found in common path: {}",
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(p) = find_in_path() {
        if p.exists() {
            log::debug!(
                target: "vidbatch::ffmpeg::discovery",
                "FFmpeg found in PATH: {}",
                p.display()
            );
            return Ok(p);
        }
    }

    log::error!(
        target: "vidbatch::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(AppError::ExecutableNotFound(
        "FFmpeg not found. Please install FFmpeg on your system:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: Download from https://ffmpeg.org/download.html"
            .to_string(),
    ))
}

/// Get the FFmpeg path. Cached for the process lifetime.
/// The `FFMPEG_PATH` env var takes precedence (for tests/CI or pinned
/// installs); PATH and common install paths are the fallback.
pub fn ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG_PATH_CACHE.get() {
        return Ok(path.as_path());
    }
    let path = if let Ok(env_path) = std::env::var("FFMPEG_PATH") {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            log::debug!(
                target: "vidbatch::ffmpeg::discovery",
                "FFmpeg path from FFMPEG_PATH env: {}",
                p.display()
            );
            p
        } else {
            resolve_ffmpeg_path()?
        }
    } else {
        resolve_ffmpeg_path()?
    };
    // Another thread may have initialized first; the cached value wins.
    let _ = FFMPEG_PATH_CACHE.set(path);
    Ok(FFMPEG_PATH_CACHE
        .get()
        .expect("ffmpeg path cache initialized above")
        .as_path())
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed sibling
/// first, then plain). Split out so the derivation is unit-testable.
pub(crate) fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let parent = match ffmpeg_path.parent() {
        Some(p) => p,
        None => return vec![],
    };
    let mut candidates = Vec::with_capacity(2);
    let stem = ffmpeg_path.file_stem().and_then(|s| s.to_str());
    if let Some(stem) = stem {
        if let Some(suffix) = stem.strip_prefix("ffmpeg") {
            if !suffix.is_empty() {
                #[cfg(target_os = "windows")]
                candidates.push(parent.join(format!("ffprobe{suffix}.exe")));
                #[cfg(not(target_os = "windows"))]
                candidates.push(parent.join(format!("ffprobe{suffix}")));
            }
        }
    }
    #[cfg(target_os = "windows")]
    candidates.push(parent.join("ffprobe.exe"));
    #[cfg(not(target_os = "windows"))]
    candidates.push(parent.join("ffprobe"));
    candidates
}

/// Get the ffprobe path: same directory as ffmpeg, suffix-aware.
pub fn ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = ffmpeg_path()?;
    for candidate in ffprobe_candidates(ffmpeg) {
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(AppError::ExecutableNotFound(format!(
        "ffprobe not found next to FFmpeg at {}",
        ffmpeg.display()
    )))
}
