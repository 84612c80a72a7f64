//! FFmpeg argument list construction.
//!
//! All builders are pure: identical inputs always produce identical argument
//! vectors. Requests reaching `build_convert_args` are pre-validated.

use std::path::Path;

use crate::request::{ConversionRequest, QualityMode};

use super::path_to_string;

/// Software encoders get a balanced speed/quality preset. Hardware encoders
/// take their own rate-control flags instead.
const SOFTWARE_PRESET: &str = "medium";

/// Forced for hardware encoders; some surfaces reject 10-bit input otherwise.
const HARDWARE_PIX_FMT: &str = "yuv420p";

const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Build the argument list for one conversion.
///
/// Layout: acceleration selector (hardware only), input, video codec,
/// preset or pixel format, rate-control flags, audio flags, then the fixed
/// tail: quiet console, final stats line, machine-readable progress on
/// stdout, overwrite flag and output path.
pub fn build_convert_args(request: &ConversionRequest) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    let family = request.hw_family();
    if let Some(family) = family {
        args.extend(["-hwaccel".to_string(), family.accel_backend().to_string()]);
    }

    args.extend(["-i".to_string(), path_to_string(&request.input)]);
    args.extend(["-c:v".to_string(), request.video_codec.clone()]);

    if family.is_some() {
        args.extend(["-pix_fmt".to_string(), HARDWARE_PIX_FMT.to_string()]);
    } else {
        args.extend(["-preset".to_string(), SOFTWARE_PRESET.to_string()]);
    }

    match request.quality {
        QualityMode::Crf(value) => {
            args.extend(["-crf".to_string(), value.to_string()]);
        }
        QualityMode::Cbr(megabits) => {
            let rate = format!("{megabits}M");
            args.extend([
                "-b:v".to_string(),
                rate.clone(),
                "-minrate".to_string(),
                rate.clone(),
                "-maxrate".to_string(),
                rate,
                "-bufsize".to_string(),
                "2M".to_string(),
            ]);
        }
        QualityMode::Cq(value) => {
            args.extend([
                "-rc".to_string(),
                "vbr".to_string(),
                "-cq".to_string(),
                value.to_string(),
            ]);
        }
    }

    if request.audio_codec == "copy" {
        args.extend(["-c:a".to_string(), "copy".to_string()]);
    } else {
        args.extend([
            "-c:a".to_string(),
            request.audio_codec.clone(),
            "-b:a".to_string(),
            DEFAULT_AUDIO_BITRATE.to_string(),
        ]);
    }

    args.extend([
        "-v".to_string(),
        "quiet".to_string(),
        "-stats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-y".to_string(),
        path_to_string(&request.output),
    ]);

    log::debug!(
        target: "vidbatch::ffmpeg::builder",
        "built convert args: codec={}, quality={:?}, input={} -> output={}",
        request.video_codec,
        request.quality,
        request.input.display(),
        request.output.display()
    );

    args
}

/// Single-frame thumbnail extraction at the given timestamp.
pub fn build_thumbnail_args(input: &Path, output: &Path, timestamp: &str) -> Vec<String> {
    vec![
        "-ss".to_string(),
        timestamp.to_string(),
        "-i".to_string(),
        path_to_string(input),
        "-vframes".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        "-y".to_string(),
        path_to_string(output),
    ]
}

fn gif_filter(fps: u32, width: u32) -> String {
    format!("fps={fps},scale={width}:-1:flags=lanczos")
}

/// First GIF pass: generate the shared palette for the clip.
pub fn build_palette_args(
    input: &Path,
    palette: &Path,
    start: &str,
    duration: f64,
    fps: u32,
    width: u32,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-ss".to_string(),
        start.to_string(),
        "-t".to_string(),
        duration.to_string(),
        "-i".to_string(),
        path_to_string(input),
        "-vf".to_string(),
        format!("{},palettegen", gif_filter(fps, width)),
        path_to_string(palette),
    ]
}

/// Second GIF pass: render the clip through the palette.
pub fn build_gif_args(
    input: &Path,
    output: &Path,
    palette: &Path,
    start: &str,
    duration: f64,
    fps: u32,
    width: u32,
) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-ss".to_string(),
        start.to_string(),
        "-t".to_string(),
        duration.to_string(),
        "-i".to_string(),
        path_to_string(input),
        "-i".to_string(),
        path_to_string(palette),
        "-filter_complex".to_string(),
        format!("{}[x];[x][1:v]paletteuse", gif_filter(fps, width)),
        path_to_string(output),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::encoders::HwFamily;
    use std::path::PathBuf;

    fn request(
        codec: &str,
        quality: QualityMode,
        audio: &str,
        hwaccel: Option<HwFamily>,
    ) -> ConversionRequest {
        ConversionRequest::new(
            PathBuf::from("in.mp4"),
            PathBuf::from("out.mp4"),
            codec,
            audio,
            quality,
            hwaccel,
        )
        .unwrap()
    }

    fn flag_value<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap_or_else(|| {
            panic!("missing flag {flag} in {args:?}");
        });
        &args[idx + 1]
    }

    #[test]
    fn crf_software_encode() {
        let args = build_convert_args(&request("libx265", QualityMode::Crf(23), "copy", None));
        assert_eq!(flag_value(&args, "-c:v"), "libx265");
        assert_eq!(flag_value(&args, "-preset"), "medium");
        assert_eq!(flag_value(&args, "-crf"), "23");
        assert_eq!(flag_value(&args, "-c:a"), "copy");
        let tail = args[args.len() - 2..].to_vec();
        assert_eq!(tail, ["-y", "out.mp4"]);
        assert!(!args.contains(&"-hwaccel".to_string()));
        assert!(!args.contains(&"-pix_fmt".to_string()));
    }

    #[test]
    fn cbr_sets_matching_rate_bounds() {
        let args = build_convert_args(&request("libx264", QualityMode::Cbr(10), "copy", None));
        assert_eq!(flag_value(&args, "-b:v"), "10M");
        assert_eq!(flag_value(&args, "-minrate"), "10M");
        assert_eq!(flag_value(&args, "-maxrate"), "10M");
        assert_eq!(flag_value(&args, "-bufsize"), "2M");
    }

    #[test]
    fn nvenc_cq_uses_cuda_and_fixed_pixel_format() {
        let args = build_convert_args(&request(
            "hevc_nvenc",
            QualityMode::Cq(24),
            "copy",
            Some(HwFamily::Nvenc),
        ));
        assert_eq!(flag_value(&args, "-hwaccel"), "cuda");
        assert_eq!(flag_value(&args, "-pix_fmt"), "yuv420p");
        assert_eq!(flag_value(&args, "-rc"), "vbr");
        assert_eq!(flag_value(&args, "-cq"), "24");
        assert!(!args.contains(&"-preset".to_string()));
        // Acceleration selector comes before the input flag.
        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(hw < input);
    }

    #[test]
    fn family_inferred_from_codec_name_without_explicit_request() {
        let args = build_convert_args(&request("h264_qsv", QualityMode::Cq(30), "copy", None));
        assert_eq!(flag_value(&args, "-hwaccel"), "qsv");
        assert_eq!(flag_value(&args, "-pix_fmt"), "yuv420p");
    }

    #[test]
    fn audio_reencode_gets_default_bitrate() {
        let args = build_convert_args(&request("libx264", QualityMode::Crf(20), "aac", None));
        assert_eq!(flag_value(&args, "-c:a"), "aac");
        assert_eq!(flag_value(&args, "-b:a"), "128k");
    }

    #[test]
    fn progress_stream_and_stats_always_present() {
        let args = build_convert_args(&request("libx264", QualityMode::Crf(20), "copy", None));
        assert_eq!(flag_value(&args, "-v"), "quiet");
        assert!(args.contains(&"-stats".to_string()));
        assert_eq!(flag_value(&args, "-progress"), "pipe:1");
    }

    #[test]
    fn builder_is_deterministic() {
        let req = request("libx265", QualityMode::Crf(23), "copy", None);
        assert_eq!(build_convert_args(&req), build_convert_args(&req));
    }

    #[test]
    fn thumbnail_args_match_expected_shape() {
        let args = build_thumbnail_args(
            Path::new("in.mp4"),
            Path::new("out.jpg"),
            "00:01:30",
        );
        assert_eq!(
            args,
            [
                "-ss", "00:01:30", "-i", "in.mp4", "-vframes", "1", "-q:v", "2", "-y", "out.jpg"
            ]
        );
    }

    #[test]
    fn palette_args_match_expected_shape() {
        let args = build_palette_args(
            Path::new("in.mp4"),
            Path::new("/tmp/palette.png"),
            "00:00:10",
            5.0,
            20,
            500,
        );
        assert_eq!(
            args,
            [
                "-y",
                "-ss",
                "00:00:10",
                "-t",
                "5",
                "-i",
                "in.mp4",
                "-vf",
                "fps=20,scale=500:-1:flags=lanczos,palettegen",
                "/tmp/palette.png"
            ]
        );
    }

    #[test]
    fn gif_args_consume_palette_through_filter_graph() {
        let args = build_gif_args(
            Path::new("in.mp4"),
            Path::new("out.gif"),
            Path::new("/tmp/palette.png"),
            "00:00:10",
            5.0,
            20,
            500,
        );
        assert_eq!(
            args,
            [
                "-y",
                "-ss",
                "00:00:10",
                "-t",
                "5",
                "-i",
                "in.mp4",
                "-i",
                "/tmp/palette.png",
                "-filter_complex",
                "fps=20,scale=500:-1:flags=lanczos[x];[x][1:v]paletteuse",
                "out.gif"
            ]
        );
    }
}
