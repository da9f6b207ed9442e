//! Link, network and transport header decoding.
//!
//! `decode` turns one captured Ethernet frame into a [`PacketRecord`] plus a
//! borrowed view of the transport payload. Every field read is checked
//! against the captured bytes first; a frame that is too short for a step
//! keeps what was already extracted and falls back to an ethertype label.

use core::fmt;
use core::net::Ipv4Addr;
use serde::{Serialize, Serializer};

use super::{FlowKey, Timestamp};
use crate::http;

const ETHERNET_HEADER_LEN: usize = 14;
const MIN_IPV4_FRAME_LEN: usize = 34;
const IPV4_MIN_HEADER_LEN: usize = 20;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const HTTP_PORT: u16 = 80;

/// One raw frame as delivered by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub timestamp: Timestamp,
    pub data: Vec<u8>,
    /// Length on the wire, which can exceed `data.len()` when the snapshot
    /// length truncated the capture.
    pub wire_len: usize,
}

impl Frame {
    #[must_use]
    pub fn new(timestamp: Timestamp, data: Vec<u8>) -> Self {
        let wire_len = data.len();
        Self {
            timestamp,
            data,
            wire_len,
        }
    }
}

/// Protocol label of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    /// TCP on port 80 or carrying an HTTP start line.
    Http,
    Arp,
    Ipv4,
    Ipv6,
    /// Unrecognised ethertype.
    Other(u16),
    /// Frame shorter than a link-layer header.
    Insufficient,
}

impl Protocol {
    fn from_ethertype(ethertype: u16) -> Self {
        match ethertype {
            ETHERTYPE_IPV4 => Self::Ipv4,
            ETHERTYPE_ARP => Self::Arp,
            ETHERTYPE_IPV6 => Self::Ipv6,
            other => Self::Other(other),
        }
    }

    /// Whether the frame carried a TCP segment, HTTP-labelled or not.
    #[must_use]
    pub fn is_tcp(self) -> bool {
        matches!(self, Self::Tcp | Self::Http)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
            Self::Http => f.write_str("HTTP"),
            Self::Arp => f.write_str("ARP"),
            Self::Ipv4 => f.write_str("IPv4"),
            Self::Ipv6 => f.write_str("IPv6"),
            Self::Other(code) => write!(f, "0x{code:04x}"),
            Self::Insufficient => f.write_str("Insufficient data"),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalized view of one decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketRecord {
    pub timestamp: Timestamp,
    pub protocol: Protocol,
    pub src_mac: Option<MacAddr>,
    pub dst_mac: Option<MacAddr>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub payload_len: usize,
    pub frame_len: usize,
}

impl PacketRecord {
    fn new(timestamp: Timestamp, frame_len: usize) -> Self {
        Self {
            timestamp,
            protocol: Protocol::Insufficient,
            src_mac: None,
            dst_mac: None,
            src_ip: None,
            dst_ip: None,
            src_port: 0,
            dst_port: 0,
            seq: 0,
            payload_len: 0,
            frame_len,
        }
    }

    /// Reassembly key for TCP records that carried addresses.
    #[must_use]
    pub fn flow_key(&self) -> Option<FlowKey> {
        if !self.protocol.is_tcp() {
            return None;
        }
        Some(FlowKey::new(
            self.src_ip?,
            self.dst_ip?,
            self.src_port,
            self.dst_port,
        ))
    }
}

/// A decoded record together with the transport payload it points into.
#[derive(Debug)]
pub struct DecodedFrame<'a> {
    pub record: PacketRecord,
    pub payload: &'a [u8],
}

/// Decode an Ethernet frame. Never fails: short or unknown frames yield the
/// coarsest label the available bytes support.
#[must_use]
pub fn decode(frame: &Frame) -> DecodedFrame<'_> {
    let mut record = PacketRecord::new(frame.timestamp, frame.wire_len);
    let payload = decode_into(&mut record, &frame.data);
    record.payload_len = payload.len();

    if record.protocol == Protocol::Tcp
        && (record.src_port == HTTP_PORT
            || record.dst_port == HTTP_PORT
            || http::looks_like_http(payload))
    {
        record.protocol = Protocol::Http;
    }

    DecodedFrame { record, payload }
}

fn decode_into<'a>(record: &mut PacketRecord, data: &'a [u8]) -> &'a [u8] {
    // Ethernet header: [6 bytes dst MAC][6 bytes src MAC][2 bytes EtherType]
    let Some(link) = data.get(..ETHERNET_HEADER_LEN) else {
        return &[];
    };
    record.dst_mac = MacAddr::from_slice(&link[0..6]);
    record.src_mac = MacAddr::from_slice(&link[6..12]);

    let ethertype = u16::from_be_bytes([link[12], link[13]]);
    record.protocol = Protocol::from_ethertype(ethertype);
    if ethertype != ETHERTYPE_IPV4 || data.len() < MIN_IPV4_FRAME_LEN {
        return &[];
    }

    let ip = &data[ETHERNET_HEADER_LEN..];
    record.src_ip = Some(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]));
    record.dst_ip = Some(Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]));

    // IHL is the lower nibble of the first byte, in 32-bit words
    let ihl = usize::from(ip[0] & 0x0F) * 4;
    if ihl < IPV4_MIN_HEADER_LEN || ihl > ip.len() {
        return &[];
    }

    // The declared total length bounds the payload; Ethernet padding past it
    // is dropped and a truncated capture keeps what was captured.
    let total_len = usize::from(u16::from_be_bytes([ip[2], ip[3]]));
    let datagram_end = total_len.clamp(ihl, ip.len());

    let transport = &ip[ihl..];
    let header_len = match ip[9] {
        IPPROTO_TCP => decode_tcp(record, transport),
        IPPROTO_UDP => decode_udp(record, transport),
        _ => None,
    };

    header_len
        .and_then(|len| ip.get(ihl + len..datagram_end))
        .unwrap_or(&[])
}

/// Returns the TCP header length when the full header was captured.
fn decode_tcp(record: &mut PacketRecord, tcp: &[u8]) -> Option<usize> {
    if !read_ports(record, tcp) {
        return None;
    }
    record.protocol = Protocol::Tcp;

    let header = tcp.get(..TCP_MIN_HEADER_LEN)?;
    record.seq = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

    // Data offset is the upper nibble of byte 12, in 32-bit words
    let data_offset = usize::from(header[12] >> 4) * 4;
    (data_offset >= TCP_MIN_HEADER_LEN && data_offset <= tcp.len()).then_some(data_offset)
}

fn decode_udp(record: &mut PacketRecord, udp: &[u8]) -> Option<usize> {
    if !read_ports(record, udp) {
        return None;
    }
    record.protocol = Protocol::Udp;
    (udp.len() >= UDP_HEADER_LEN).then_some(UDP_HEADER_LEN)
}

fn read_ports(record: &mut PacketRecord, transport: &[u8]) -> bool {
    let Some(ports) = transport.get(..4) else {
        return false;
    };
    record.src_port = u16::from_be_bytes([ports[0], ports[1]]);
    record.dst_port = u16::from_be_bytes([ports[2], ports[3]]);
    true
}
