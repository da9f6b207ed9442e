//! Capture sessions.
//!
//! A session runs on a dedicated worker thread: it pulls frames from a
//! [`FrameSource`], pushes them through the [`CapturePipeline`] and sends
//! [`CaptureEvent`]s to whoever holds the [`CaptureSession`].

mod events;
mod pipeline;
mod session;
mod source;

pub use events::{CaptureEvent, Statistics};
pub use pipeline::{
    CaptureConfig, CapturePipeline, DEFAULT_FILTER, DEFAULT_IDLE_TIMEOUT, DEFAULT_STATS_EVERY,
};
pub use session::{CaptureSession, spawn, start};
pub use source::{DeviceInfo, FrameSource, PcapSource, Pulled, list_devices};
