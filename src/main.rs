//! CLI surface over the conversion engine.
//!
//! Progress and results are printed as one JSON object per line on stdout
//! so another process can consume them; diagnostics go to stderr via
//! `env_logger` (`RUST_LOG`).

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use vidbatch::ffmpeg::{EncoderCatalog, HwFamily, create_gif, create_thumbnail, spawn_capability_scan};
use vidbatch::{
    AppError, BatchJob, EncodeSettings, QualityMode, WorkerEvent, event_channel, spawn_batch,
};

#[derive(Parser)]
#[command(
    name = "vidbatch",
    version,
    about = "Convert video files with FFmpeg, in batches, with live progress"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Convert one or more video files into an output directory.
    Convert {
        /// Input video files, converted in order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for converted outputs.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Video encoder name (see `vidbatch encoders`).
        #[arg(long, default_value = "libx265")]
        codec: String,

        /// Audio codec, or `copy` to pass the stream through.
        #[arg(long, default_value = "copy")]
        audio: String,

        /// Rate-control mode: crf, cbr or cq.
        #[arg(long, default_value = "crf")]
        mode: String,

        /// CRF/CQ value, or bitrate in megabits for cbr.
        #[arg(long, default_value_t = 23)]
        value: u32,

        /// Hardware family: nvenc, qsv, videotoolbox, vaapi or amf.
        #[arg(long)]
        hwaccel: Option<String>,
    },

    /// Extract a single-frame thumbnail.
    Thumbnail {
        input: PathBuf,
        output: PathBuf,

        /// Timestamp to capture, e.g. 00:01:30.
        #[arg(long, default_value = "00:00:01")]
        at: String,
    },

    /// Render an animated GIF from a clip of the source.
    Gif {
        input: PathBuf,
        output: PathBuf,

        /// Clip start timestamp.
        #[arg(long, default_value = "00:00:00")]
        start: String,

        /// Clip length in seconds.
        #[arg(long, default_value_t = 3.0)]
        duration: f64,

        #[arg(long, default_value_t = 15)]
        fps: u32,

        /// Output width in pixels; height follows the aspect ratio.
        #[arg(long, default_value_t = 480)]
        width: u32,
    },

    /// List video encoders available in the FFmpeg build.
    Encoders {
        /// Query the tool again instead of using the cached listing.
        #[arg(long)]
        rescan: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let code = match cli.command {
        CliCommand::Convert {
            inputs,
            output_dir,
            codec,
            audio,
            mode,
            value,
            hwaccel,
        } => run_convert(inputs, output_dir, codec, audio, &mode, value, hwaccel),
        CliCommand::Thumbnail { input, output, at } => {
            report_outcome(
                create_thumbnail(&input, &output, &at),
                format!("thumbnail written to {}", output.display()),
            )
        }
        CliCommand::Gif {
            input,
            output,
            start,
            duration,
            fps,
            width,
        } => report_outcome(
            create_gif(&input, &output, &start, duration, fps, width),
            format!("gif written to {}", output.display()),
        ),
        CliCommand::Encoders { rescan } => run_encoders(rescan),
    };

    std::process::exit(code);
}

fn run_convert(
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    codec: String,
    audio: String,
    mode: &str,
    value: u32,
    hwaccel: Option<String>,
) -> i32 {
    let quality = match mode {
        "crf" => QualityMode::Crf(value),
        "cbr" => QualityMode::Cbr(value),
        "cq" => QualityMode::Cq(value),
        other => {
            print_json(&json!({
                "type": "error",
                "message": format!("unknown mode: {other} (expected crf, cbr or cq)"),
            }));
            return 1;
        }
    };
    let hwaccel = match hwaccel.as_deref().map(str::parse::<HwFamily>).transpose() {
        Ok(family) => family,
        Err(err) => {
            print_json(&json!({ "type": "error", "message": err.to_string() }));
            return 1;
        }
    };

    let job = BatchJob {
        inputs,
        output_dir,
        settings: EncodeSettings {
            video_codec: codec,
            audio_codec: audio,
            quality,
            hwaccel,
        },
    };

    let handle = spawn_batch(job, None);
    let mut failed = false;
    while let Some(event) = handle.events.recv() {
        if matches!(event, WorkerEvent::Error(_)) {
            failed = true;
        }
        print_event(&event);
    }
    handle.join();

    if failed { 1 } else { 0 }
}

fn run_encoders(rescan: bool) -> i32 {
    let catalog = Arc::new(EncoderCatalog::new());
    if rescan {
        // Force the rescan up front; the scan thread then reads the fresh cache.
        if let Err(err) = catalog.list_encoders(true) {
            print_json(&json!({ "type": "error", "message": err.to_string() }));
            return 1;
        }
    }

    let (publisher, queue) = event_channel();
    let scan = spawn_capability_scan(Arc::clone(&catalog), publisher);
    let code = match queue.recv() {
        Some(WorkerEvent::CapabilityUpdate(capabilities)) => {
            for capability in &capabilities {
                match serde_json::to_string(capability) {
                    Ok(line) => println!("{line}"),
                    Err(err) => {
                        log::warn!(target: "vidbatch::cli", "skipping unserializable entry: {err}");
                    }
                }
            }
            0
        }
        Some(WorkerEvent::Error(message)) => {
            print_json(&json!({ "type": "error", "message": message }));
            1
        }
        _ => 1,
    };
    let _ = scan.join();
    code
}

fn report_outcome(result: Result<(), AppError>, success_message: String) -> i32 {
    match result {
        Ok(()) => {
            print_json(&json!({ "type": "success", "message": success_message }));
            0
        }
        Err(err) => {
            print_json(&json!({ "type": "error", "message": err.to_string() }));
            1
        }
    }
}

/// Map worker events onto the line protocol: `progress` (status text rides
/// along with the unknown percentage, like warnings), `error`, `success`.
fn print_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Progress { percent, message } => print_json(&json!({
            "type": "progress",
            "percentage": percent,
            "message": message,
        })),
        WorkerEvent::Status(text) => print_json(&json!({
            "type": "progress",
            "percentage": -1,
            "message": text,
        })),
        WorkerEvent::Error(text) => {
            print_json(&json!({ "type": "error", "message": text }))
        }
        WorkerEvent::Done(text) => {
            print_json(&json!({ "type": "success", "message": text }))
        }
        WorkerEvent::CapabilityUpdate(capabilities) => print_json(&json!({
            "type": "progress",
            "percentage": -1,
            "message": format!("{} encoders available", capabilities.len()),
        })),
    }
}

fn print_json(value: &serde_json::Value) {
    let mut out = io::stdout();
    if serde_json::to_writer(&mut out, value).is_ok() {
        let _ = out.write_all(b"\n");
        let _ = out.flush();
    }
}
