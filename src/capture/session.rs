use super::events::CaptureEvent;
use super::pipeline::{CaptureConfig, CapturePipeline, send};
use super::source::{FrameSource, PcapSource};
use crate::error::Error;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// A capture running on its own worker thread.
///
/// Events arrive through [`CaptureSession::recv`] until the worker finishes,
/// either because the source ran out of frames, an error ended the session
/// or [`CaptureSession::stop`] was called. Dropping the session stops the
/// worker and waits for it.
pub struct CaptureSession {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    events: kanal::Receiver<CaptureEvent>,
}

impl CaptureSession {
    /// Block until the next event. `None` once the worker has finished and
    /// every event has been received.
    #[must_use]
    pub fn recv(&self) -> Option<CaptureEvent> {
        self.events.recv().ok()
    }

    #[must_use]
    pub fn events(&self) -> &kanal::Receiver<CaptureEvent> {
        &self.events
    }

    /// Ask the worker to stop. It notices within one read timeout.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the worker to finish.
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Capture worker panicked");
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

/// Start a capture worker. `open` runs on the worker and builds the frame
/// source; if it fails the session ends with a single `CaptureFailed`.
#[must_use]
pub fn spawn<S, F>(config: CaptureConfig, open: F) -> CaptureSession
where
    S: FrameSource,
    F: FnOnce(&CaptureConfig) -> Result<S, Error> + Send + 'static,
{
    let (tx, rx) = kanal::unbounded();
    let stop = Arc::new(AtomicBool::new(false));

    let worker = std::thread::spawn({
        let stop = Arc::clone(&stop);
        move || run_session(&config, open, &tx, &stop)
    });

    CaptureSession {
        stop,
        worker: Some(worker),
        events: rx,
    }
}

/// Start a libpcap capture described by `config`: the capture file when one
/// is set, otherwise the configured or default device.
#[must_use]
pub fn start(config: CaptureConfig) -> CaptureSession {
    spawn(config, |config| match &config.capture_file {
        Some(path) => PcapSource::offline(path, &config.filter),
        None => PcapSource::live(config.device.as_deref(), &config.filter),
    })
}

fn run_session<S, F>(
    config: &CaptureConfig,
    open: F,
    events: &kanal::Sender<CaptureEvent>,
    stop: &AtomicBool,
) where
    S: FrameSource,
    F: FnOnce(&CaptureConfig) -> Result<S, Error>,
{
    let mut source = match open(config) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to start capture: {e}");
            fail(events, &e);
            return;
        }
    };
    info!(filter = %config.filter, "Capture started");

    let mut pipeline = CapturePipeline::new(config, events.clone());
    let result = pipeline.run(&mut source, stop);
    source.stop();

    if let Err(e) = result {
        warn!("Error reading packet: {e}");
        fail(events, &e);
    }

    let stats = pipeline.statistics();
    // Reassembly state is dropped with the pipeline, never flushed
    drop(pipeline);
    send(events, CaptureEvent::StatisticsUpdated(stats));
    info!(
        total = stats.total,
        tcp = stats.tcp,
        udp = stats.udp,
        http = stats.http,
        "Capture stopped"
    );
}

fn fail(events: &kanal::Sender<CaptureEvent>, e: &Error) {
    send(
        events,
        CaptureEvent::CaptureFailed {
            reason: e.to_string(),
        },
    );
}
