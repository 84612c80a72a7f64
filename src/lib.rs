pub mod error;
pub mod events;
pub mod ffmpeg;
pub mod request;
pub mod worker;

pub use error::AppError;
pub use events::{EventPublisher, EventQueue, WorkerEvent, event_channel};
pub use request::{ConversionRequest, QualityMode};
pub use worker::{BatchHandle, BatchJob, EncodeSettings, spawn_batch};
