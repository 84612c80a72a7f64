//! Ordered, thread-safe event channel between the batch worker and its
//! single consumer.
//!
//! The worker never touches consumer-owned state; all cross-thread
//! communication is immutable messages on this channel. The consumer side
//! may poll at a fixed interval (`try_recv`, safe when empty) or
//! block-read (`recv`); publish order is preserved and nothing is dropped.

use std::sync::mpsc;

use crate::ffmpeg::encoders::EncoderCapability;

/// Message kinds published by the worker and the capability scan.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Normalized progress for the request currently converting.
    /// `percent` is 0-100, or -1 when the duration is unknown.
    Progress { percent: i32, message: String },
    /// Batch lifecycle announcements ("(2/5) converting clip.mp4").
    Status(String),
    /// Terminal failure for the batch. At most one per run.
    Error(String),
    /// All requests finished successfully.
    Done(String),
    /// Result of an encoder capability scan, for populating selectable
    /// options.
    CapabilityUpdate(Vec<EncoderCapability>),
}

/// Producer half. Cloneable so the worker thread and the capability scan
/// can publish onto the same queue.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<WorkerEvent>,
}

impl EventPublisher {
    /// Enqueue an event. A vanished consumer is not an error for the
    /// worker; the send is simply dropped.
    pub fn publish(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Consumer half, owned by exactly one reader (a UI loop or CLI printer).
pub struct EventQueue {
    rx: mpsc::Receiver<WorkerEvent>,
}

impl EventQueue {
    /// Non-blocking poll. `None` when the queue is currently empty or all
    /// publishers are gone.
    pub fn try_recv(&self) -> Option<WorkerEvent> {
        self.rx.try_recv().ok()
    }

    /// Blocking read. `None` once all publishers are gone and the queue is
    /// drained.
    pub fn recv(&self) -> Option<WorkerEvent> {
        self.rx.recv().ok()
    }
}

pub fn event_channel() -> (EventPublisher, EventQueue) {
    let (tx, rx) = mpsc::channel();
    (EventPublisher { tx }, EventQueue { rx })
}
