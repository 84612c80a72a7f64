//! Validated conversion request model.
//!
//! A request is constructed immediately before use and never mutated after
//! being handed to the supervisor. Illegal quality-mode/value combinations
//! are rejected here, before any process is spawned.

use std::path::PathBuf;

use crate::error::AppError;
use crate::ffmpeg::encoders::HwFamily;

/// Rate-control strategy. `Crf`/`Cq` are quality-driven and structurally
/// exclusive with the constant-bitrate variant; `Cq` is the hardware-encoder
/// analog of CRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityMode {
    /// Constant rate factor, 0-51.
    Crf(u32),
    /// Constant bitrate in megabits per second, >= 1.
    Cbr(u32),
    /// Constant quality for hardware encoders, 0-51.
    Cq(u32),
}

impl QualityMode {
    pub fn validate(&self) -> Result<(), AppError> {
        match *self {
            QualityMode::Crf(v) if v > 51 => Err(AppError::ValidationError(format!(
                "crf value {v} out of range (0-51)"
            ))),
            QualityMode::Cq(v) if v > 51 => Err(AppError::ValidationError(format!(
                "cq value {v} out of range (0-51)"
            ))),
            QualityMode::Cbr(0) => Err(AppError::ValidationError(
                "cbr bitrate must be at least 1 megabit".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// One file conversion: input, output, codecs and rate control.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video_codec: String,
    /// `copy` passes the audio stream through unmodified.
    pub audio_codec: String,
    pub quality: QualityMode,
    pub hwaccel: Option<HwFamily>,
}

impl ConversionRequest {
    pub fn new(
        input: PathBuf,
        output: PathBuf,
        video_codec: impl Into<String>,
        audio_codec: impl Into<String>,
        quality: QualityMode,
        hwaccel: Option<HwFamily>,
    ) -> Result<Self, AppError> {
        let video_codec = video_codec.into();
        let audio_codec = audio_codec.into();
        if video_codec.is_empty() {
            return Err(AppError::ValidationError(
                "video codec must not be empty".to_string(),
            ));
        }
        if audio_codec.is_empty() {
            return Err(AppError::ValidationError(
                "audio codec must not be empty".to_string(),
            ));
        }
        quality.validate()?;
        Ok(Self {
            input,
            output,
            video_codec,
            audio_codec,
            quality,
            hwaccel,
        })
    }

    /// The hardware family in effect: the explicitly requested one, or the
    /// family implied by the codec name (e.g. `hevc_nvenc`).
    pub fn hw_family(&self) -> Option<HwFamily> {
        self.hwaccel
            .or_else(|| HwFamily::from_encoder_name(&self.video_codec))
    }

    pub fn is_hardware(&self) -> bool {
        self.hw_family().is_some()
    }
}
