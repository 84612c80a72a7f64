//! Encoder catalog: queries `ffmpeg -encoders` once and caches the result.
//!
//! The cache is rebuilt wholesale on a forced rescan; there is no partial
//! update, so readers never observe a half-populated list.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::thread;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;

use crate::error::AppError;
use crate::events::{EventPublisher, WorkerEvent};

use super::discovery::ffmpeg_path;
use super::runner::run_capture;

/// One encoder entry per line: a 6-character flag block (V/A/S kind marker
/// first), then the encoder token. Example: ` V....D libx264 ...`.
static ENCODER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ ([VAS])[FXBSD.]{5} +(\S+)").expect("invalid encoder listing regex")
});

/// Hardware-acceleration family an encoder belongs to, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HwFamily {
    Nvenc,
    Qsv,
    VideoToolbox,
    Vaapi,
    Amf,
}

impl HwFamily {
    pub fn from_encoder_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("nvenc") {
            Some(Self::Nvenc)
        } else if lower.contains("qsv") {
            Some(Self::Qsv)
        } else if lower.contains("videotoolbox") {
            Some(Self::VideoToolbox)
        } else if lower.contains("vaapi") {
            Some(Self::Vaapi)
        } else if lower.contains("amf") {
            Some(Self::Amf)
        } else {
            None
        }
    }

    /// Value for the `-hwaccel` selector implied by this family.
    pub fn accel_backend(self) -> &'static str {
        match self {
            Self::Nvenc => "cuda",
            Self::Qsv => "qsv",
            Self::VideoToolbox => "videotoolbox",
            Self::Vaapi => "vaapi",
            Self::Amf => "d3d11va",
        }
    }
}

impl fmt::Display for HwFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::VideoToolbox => "videotoolbox",
            Self::Vaapi => "vaapi",
            Self::Amf => "amf",
        };
        f.write_str(name)
    }
}

impl FromStr for HwFamily {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nvenc" => Ok(Self::Nvenc),
            "qsv" => Ok(Self::Qsv),
            "videotoolbox" => Ok(Self::VideoToolbox),
            "vaapi" => Ok(Self::Vaapi),
            "amf" => Ok(Self::Amf),
            other => Err(AppError::ValidationError(format!(
                "unknown hardware family: {other} (expected nvenc, qsv, videotoolbox, vaapi or amf)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

/// One encoder the FFmpeg build exposes. Immutable once queried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncoderCapability {
    pub name: String,
    pub kind: MediaKind,
    pub hardware: Option<HwFamily>,
}

/// Parse the `ffmpeg -hide_banner -encoders` listing into capabilities.
/// Subtitle encoders and the flag legend at the top are skipped.
pub(crate) fn parse_encoder_listing(raw: &str) -> Vec<EncoderCapability> {
    let mut capabilities = Vec::new();
    for line in raw.lines() {
        let Some(caps) = ENCODER_LINE_RE.captures(line) else {
            continue;
        };
        let name = &caps[2];
        // Legend lines look like ` V..... = Video`; the token is "=".
        if name == "=" {
            continue;
        }
        let kind = match &caps[1] {
            "V" => MediaKind::Video,
            "A" => MediaKind::Audio,
            _ => continue,
        };
        capabilities.push(EncoderCapability {
            name: name.to_string(),
            kind,
            hardware: HwFamily::from_encoder_name(name),
        });
    }
    capabilities
}

type ScanFn = Box<dyn Fn() -> Result<String, AppError> + Send + Sync>;

/// Owns the encoder cache for the process lifetime. The cache is populated
/// by the first `list_encoders` call and replaced wholesale on rescan.
pub struct EncoderCatalog {
    cache: Mutex<Option<Arc<Vec<EncoderCapability>>>>,
    scanner: Option<ScanFn>,
}

impl EncoderCatalog {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
            scanner: None,
        }
    }

    #[cfg(test)]
    fn with_scanner(scanner: ScanFn) -> Self {
        Self {
            cache: Mutex::new(None),
            scanner: Some(scanner),
        }
    }

    /// List the video encoders the FFmpeg build supports. Cached after the
    /// first successful call; `force_rescan` re-queries the tool and
    /// replaces the cache. On failure the cache is left untouched.
    pub fn list_encoders(
        &self,
        force_rescan: bool,
    ) -> Result<Arc<Vec<EncoderCapability>>, AppError> {
        if !force_rescan {
            if let Some(cached) = self.cache.lock().as_ref() {
                log::trace!(
                    target: "vidbatch::ffmpeg::encoders",
                    "returning cached encoder list ({} entries)",
                    cached.len()
                );
                return Ok(Arc::clone(cached));
            }
        }

        let raw = self.scan()?;
        let video: Vec<EncoderCapability> = parse_encoder_listing(&raw)
            .into_iter()
            .filter(|c| c.kind == MediaKind::Video)
            .collect();
        log::debug!(
            target: "vidbatch::ffmpeg::encoders",
            "encoder scan found {} video encoders",
            video.len()
        );
        let list = Arc::new(video);
        *self.cache.lock() = Some(Arc::clone(&list));
        Ok(list)
    }

    fn scan(&self) -> Result<String, AppError> {
        if let Some(scanner) = &self.scanner {
            return scanner();
        }
        let ffmpeg = ffmpeg_path()?;
        let output = run_capture(ffmpeg, &["-hide_banner".into(), "-encoders".into()])?;
        if !output.status.success() {
            return Err(AppError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        String::from_utf8(output.stdout)
            .map_err(|_| AppError::ParseError("encoder listing was not valid UTF-8".to_string()))
    }
}

impl Default for EncoderCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Query encoder capabilities on a short-lived thread, independent of any
/// batch run, and publish the result as a `CapabilityUpdate` event.
pub fn spawn_capability_scan(
    catalog: Arc<EncoderCatalog>,
    events: EventPublisher,
) -> thread::JoinHandle<()> {
    thread::spawn(move || match catalog.list_encoders(false) {
        Ok(list) => events.publish(WorkerEvent::CapabilityUpdate((*list).clone())),
        Err(err) => {
            log::warn!(
                target: "vidbatch::ffmpeg::encoders",
                "encoder capability scan failed: {}",
                err
            );
            events.publish(WorkerEvent::Error(format!("encoder scan failed: {err}")));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LISTING: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 ------
 V....D libx264
 V....D libx265
 V....D h264_nvenc
 V....D hevc_videotoolbox
 V....D hevc_qsv
 A....D aac
 S..... srt
";

    #[test]
    fn listing_parses_video_and_audio_tokens() {
        let caps = parse_encoder_listing(LISTING);
        let names: Vec<&str> = caps.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"libx264"));
        assert!(names.contains(&"h264_nvenc"));
        assert!(names.contains(&"aac"));
        assert!(!names.contains(&"srt"), "subtitle encoders are skipped");
        assert!(!names.contains(&"="), "flag legend lines are skipped");
    }

    #[test]
    fn listing_tags_hardware_families() {
        let caps = parse_encoder_listing(LISTING);
        let by_name = |n: &str| caps.iter().find(|c| c.name == n).unwrap();
        assert_eq!(by_name("libx264").hardware, None);
        assert_eq!(by_name("h264_nvenc").hardware, Some(HwFamily::Nvenc));
        assert_eq!(
            by_name("hevc_videotoolbox").hardware,
            Some(HwFamily::VideoToolbox)
        );
        assert_eq!(by_name("hevc_qsv").hardware, Some(HwFamily::Qsv));
    }

    #[test]
    fn list_encoders_filters_to_video() {
        let catalog =
            EncoderCatalog::with_scanner(Box::new(|| Ok(LISTING.to_string())));
        let list = catalog.list_encoders(false).unwrap();
        assert!(list.iter().all(|c| c.kind == MediaKind::Video));
        assert!(list.iter().any(|c| c.name == "libx264"));
        assert!(!list.iter().any(|c| c.name == "aac"));
    }

    #[test]
    fn second_call_hits_cache_without_rescan() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&count);
        let catalog = EncoderCatalog::with_scanner(Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(LISTING.to_string())
        }));

        catalog.list_encoders(false).unwrap();
        catalog.list_encoders(false).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn force_rescan_replaces_cache_wholesale() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&count);
        let catalog = EncoderCatalog::with_scanner(Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(LISTING.to_string())
            } else {
                Ok(" V....D libaom-av1\n".to_string())
            }
        }));

        let first = catalog.list_encoders(false).unwrap();
        assert!(first.iter().any(|c| c.name == "libx264"));

        let second = catalog.list_encoders(true).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].name, "libaom-av1");

        // The replacement is what later cached reads observe.
        let third = catalog.list_encoders(false).unwrap();
        assert_eq!(*third, *second);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn scan_failure_leaves_cache_stale() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&count);
        let catalog = EncoderCatalog::with_scanner(Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(LISTING.to_string())
            } else {
                Err(AppError::CommandFailed {
                    code: 1,
                    stderr: "boom".to_string(),
                })
            }
        }));

        let first = catalog.list_encoders(false).unwrap();
        assert!(catalog.list_encoders(true).is_err());
        let after = catalog.list_encoders(false).unwrap();
        assert_eq!(*after, *first, "failed rescan must not clobber the cache");
    }

    #[test]
    fn family_from_name_and_backend() {
        assert_eq!(HwFamily::from_encoder_name("hevc_nvenc"), Some(HwFamily::Nvenc));
        assert_eq!(HwFamily::from_encoder_name("h264_qsv"), Some(HwFamily::Qsv));
        assert_eq!(HwFamily::from_encoder_name("libx265"), None);
        assert_eq!(HwFamily::Nvenc.accel_backend(), "cuda");
        assert_eq!(HwFamily::VideoToolbox.accel_backend(), "videotoolbox");
    }

    #[test]
    fn family_round_trips_through_strings() {
        for name in ["nvenc", "qsv", "videotoolbox", "vaapi", "amf"] {
            let family: HwFamily = name.parse().unwrap();
            assert_eq!(family.to_string(), name);
        }
        assert!("cuda".parse::<HwFamily>().is_err());
    }
}
