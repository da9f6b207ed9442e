use super::events::{CaptureEvent, Statistics};
use super::source::{FrameSource, Pulled};
use crate::error::Error;
use crate::http;
use crate::packet::{self, DecodedFrame, FlowKey, Frame, Protocol};
use crate::stream::{MessageSink, StreamReassembler};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_FILTER: &str = "tcp or udp or (tcp port 80)";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_STATS_EVERY: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Interface to open. `None` selects the default device.
    pub device: Option<String>,
    /// Replay this pcap file instead of capturing live.
    pub capture_file: Option<PathBuf>,
    /// libpcap filter expression. Empty installs no filter.
    pub filter: String,
    /// Flows silent for longer than this are evicted.
    pub idle_timeout: Duration,
    /// Emit statistics and evict idle flows every this many frames. Zero
    /// disables periodic statistics; eviction then runs every
    /// `DEFAULT_STATS_EVERY` frames.
    pub stats_every: u64,
    /// End the session after this many frames.
    pub packet_limit: Option<u64>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            capture_file: None,
            filter: DEFAULT_FILTER.to_owned(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            stats_every: DEFAULT_STATS_EVERY,
            packet_limit: None,
        }
    }
}

/// Decodes frames, feeds TCP payloads into the reassembler and forwards
/// records and completed HTTP messages as events.
pub struct CapturePipeline {
    reassembler: StreamReassembler,
    stats: Statistics,
    idle_timeout: Duration,
    stats_every: u64,
    packet_limit: Option<u64>,
    events: kanal::Sender<CaptureEvent>,
}

impl CapturePipeline {
    #[must_use]
    pub fn new(config: &CaptureConfig, events: kanal::Sender<CaptureEvent>) -> Self {
        Self {
            reassembler: StreamReassembler::new(),
            stats: Statistics::default(),
            idle_timeout: config.idle_timeout,
            stats_every: config.stats_every,
            packet_limit: config.packet_limit,
            events,
        }
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    #[must_use]
    pub fn reassembler(&self) -> &StreamReassembler {
        &self.reassembler
    }

    pub fn process_frame(&mut self, frame: &Frame) {
        let DecodedFrame { record, payload } = packet::decode(frame);

        self.stats.total += 1;
        if record.protocol.is_tcp() {
            self.stats.tcp += 1;
        } else if record.protocol == Protocol::Udp {
            self.stats.udp += 1;
        }

        debug!(
            protocol = %record.protocol,
            len = record.frame_len,
            payload = record.payload_len,
            "Packet"
        );

        let flow = record.flow_key();
        let seq = record.seq;
        send(&self.events, CaptureEvent::PacketObserved(record));

        if let Some(flow) = flow
            && !payload.is_empty()
        {
            let mut sink = HttpForwarder {
                events: &self.events,
                http: &mut self.stats.http,
            };
            self.reassembler.ingest(flow, seq, payload, &mut sink);
        }

        let evict_every = match self.stats_every {
            0 => DEFAULT_STATS_EVERY,
            every => every,
        };
        if self.stats.total % evict_every == 0 {
            self.reassembler.evict_idle(self.idle_timeout);
        }
        if self.stats_every > 0 && self.stats.total % self.stats_every == 0 {
            send(&self.events, CaptureEvent::StatisticsUpdated(self.stats));
        }
    }

    fn limit_reached(&self) -> bool {
        self.packet_limit
            .is_some_and(|limit| self.stats.total >= limit)
    }

    /// Pull frames from `source` until it is exhausted, the packet limit is
    /// reached or `stop` is raised.
    pub fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        stop: &AtomicBool,
    ) -> Result<(), Error> {
        while !stop.load(Ordering::Relaxed) {
            if self.limit_reached() {
                info!(packets = self.stats.total, "Packet limit reached");
                break;
            }
            match source.next_frame()? {
                Pulled::Frame(frame) => self.process_frame(&frame),
                Pulled::Timeout => {
                    // This is normal, just continue
                }
                Pulled::Exhausted => {
                    info!("Frame source exhausted");
                    break;
                }
            }
        }
        Ok(())
    }
}

struct HttpForwarder<'a> {
    events: &'a kanal::Sender<CaptureEvent>,
    http: &'a mut u64,
}

impl MessageSink for HttpForwarder<'_> {
    fn message_complete(&mut self, flow: FlowKey, message: &[u8]) {
        let message = http::parse(message);
        *self.http += 1;
        info!(%flow, "{message}");
        send(self.events, CaptureEvent::HttpMessageObserved { flow, message });
    }
}

pub(super) fn send(events: &kanal::Sender<CaptureEvent>, event: CaptureEvent) {
    if events.send(event).is_err() {
        debug!("Event receiver dropped");
    }
}
