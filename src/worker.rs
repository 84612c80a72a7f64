//! Fail-fast batch queue worker.
//!
//! One dedicated thread per batch run, sequential across files: a single
//! active encoder at a time keeps hardware encoders uncontended and
//! progress semantics simple. All status flows to the consumer through the
//! event channel; the worker owns no consumer-visible state.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crate::error::AppError;
use crate::events::{EventPublisher, EventQueue, WorkerEvent, event_channel};
use crate::ffmpeg::builder::build_convert_args;
use crate::ffmpeg::encoders::HwFamily;
use crate::ffmpeg::ffprobe::probe_duration;
use crate::ffmpeg::progress::UNKNOWN_PERCENT;
use crate::ffmpeg::runner::{CancelToken, run_encoder};
use crate::request::{ConversionRequest, QualityMode};

const OUTPUT_SUFFIX: &str = "_converted";

/// Encode parameters applied to every input of a batch.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub quality: QualityMode,
    pub hwaccel: Option<HwFamily>,
}

impl EncodeSettings {
    fn build_request(
        &self,
        input: PathBuf,
        output: PathBuf,
    ) -> Result<ConversionRequest, AppError> {
        ConversionRequest::new(
            input,
            output,
            self.video_codec.clone(),
            self.audio_codec.clone(),
            self.quality,
            self.hwaccel,
        )
    }
}

/// An ordered queue of inputs converted with shared settings into one
/// output directory. Fail-fast: the first failure stops the queue;
/// already-produced outputs are left in place.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub settings: EncodeSettings,
}

/// External action invoked only after `Done` is published (e.g. a shutdown
/// hook). Never invoked when the batch fails.
pub type PostBatchAction = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a running batch: the event queue to drain, the cancellation
/// token, and the worker thread to join.
pub struct BatchHandle {
    pub events: EventQueue,
    cancel: CancelToken,
    thread: JoinHandle<()>,
}

impl BatchHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Output path for an input: `<output_dir>/<basename>_converted.<ext>`,
/// keeping the input's container extension (`mp4` when it has none).
pub fn derive_output_path(output_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input.extension().and_then(|e| e.to_str()).unwrap_or("mp4");
    output_dir.join(format!("{stem}{OUTPUT_SUFFIX}.{ext}"))
}

/// Start a batch on its own worker thread.
pub fn spawn_batch(job: BatchJob, post_action: Option<PostBatchAction>) -> BatchHandle {
    let (publisher, events) = event_channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let thread = thread::spawn(move || {
        run_batch(&job, &publisher, &token, post_action);
    });
    BatchHandle {
        events,
        cancel,
        thread,
    }
}

/// Run the batch to completion on the calling thread.
pub fn run_batch(
    job: &BatchJob,
    events: &EventPublisher,
    cancel: &CancelToken,
    post_action: Option<PostBatchAction>,
) {
    if let Err(err) = std::fs::create_dir_all(&job.output_dir) {
        events.publish(WorkerEvent::Error(format!(
            "cannot create output directory {}: {err}",
            job.output_dir.display()
        )));
        return;
    }
    let completed = process_queue(job, events, |request, _index| {
        convert_one(request, events, cancel)
    });
    if completed {
        if let Some(action) = post_action {
            action();
        }
    }
}

/// Queue sequencing with the per-request conversion injected. Returns true
/// only when every request succeeded and `Done` was published.
fn process_queue<F>(job: &BatchJob, events: &EventPublisher, mut run_one: F) -> bool
where
    F: FnMut(&ConversionRequest, usize) -> Result<(), AppError>,
{
    let total = job.inputs.len();
    for (index, input) in job.inputs.iter().enumerate() {
        let output = derive_output_path(&job.output_dir, input);
        let name = display_name(input);
        events.publish(WorkerEvent::Status(format!(
            "({}/{}) converting {}",
            index + 1,
            total,
            name
        )));

        let request = match job.settings.build_request(input.clone(), output) {
            Ok(request) => request,
            Err(err) => {
                log::error!(
                    target: "vidbatch::worker",
                    "rejecting request for {}: {}",
                    name,
                    err
                );
                events.publish(WorkerEvent::Error(format!("{name}: {err}")));
                return false;
            }
        };

        if let Err(err) = run_one(&request, index) {
            log::error!(
                target: "vidbatch::worker",
                "conversion failed for {}: {}",
                name,
                err
            );
            events.publish(WorkerEvent::Error(format!("{name}: {err}")));
            return false;
        }
    }

    events.publish(WorkerEvent::Done("all conversions finished".to_string()));
    true
}

fn convert_one(
    request: &ConversionRequest,
    events: &EventPublisher,
    cancel: &CancelToken,
) -> Result<(), AppError> {
    if !request.input.exists() {
        return Err(AppError::ValidationError(format!(
            "input file not found: {}",
            request.input.display()
        )));
    }

    // Probe failure is non-fatal: one warning, then the unknown sentinel
    // for the rest of this request.
    let duration = match probe_duration(&request.input) {
        Ok(secs) => Some(secs),
        Err(err) => {
            let warning = AppError::DurationUnavailable(err.to_string());
            log::warn!(
                target: "vidbatch::worker",
                "probe failed for {}: {}",
                request.input.display(),
                warning
            );
            events.publish(WorkerEvent::Progress {
                percent: UNKNOWN_PERCENT,
                message: format!("warning: {warning}; progress reporting disabled"),
            });
            None
        }
    };

    let args = build_convert_args(request);
    run_encoder(args, duration, Some(cancel), |snapshot| {
        events.publish(WorkerEvent::Progress {
            percent: snapshot.percent,
            message: snapshot.message,
        });
    })
}

fn display_name(input: &Path) -> String {
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string())
}
