pub mod builder;
pub mod discovery;
pub mod encoders;
pub mod extract;
pub mod ffprobe;
pub mod progress;
pub mod runner;

pub use builder::build_convert_args;
pub use encoders::{EncoderCapability, EncoderCatalog, HwFamily, MediaKind, spawn_capability_scan};
pub use extract::{create_gif, create_thumbnail};
pub use ffprobe::probe_duration;
pub use progress::{ProgressParser, ProgressSnapshot, UNKNOWN_PERCENT};
pub use runner::{CancelToken, run_encoder};

use std::path::Path;

pub(crate) fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
