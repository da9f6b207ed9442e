use crate::http::HttpMessage;
use crate::packet::{FlowKey, PacketRecord};
use serde::Serialize;

/// Running packet counters of one capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: u64,
    pub tcp: u64,
    pub udp: u64,
    pub http: u64,
}

/// Notification sent from the capture worker to the display side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CaptureEvent {
    PacketObserved(PacketRecord),
    HttpMessageObserved { flow: FlowKey, message: HttpMessage },
    StatisticsUpdated(Statistics),
    CaptureFailed { reason: String },
}
