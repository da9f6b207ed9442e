//! TCP flow identification
//!
//! This module provides the `FlowKey` struct which identifies one direction of
//! a TCP connection using the 4-tuple: source IP, destination IP, source port
//! and destination port.
//!
//! Request and response traffic of the same connection produce two distinct
//! keys so each direction is reassembled independently.

use core::fmt;
use core::net::Ipv4Addr;
use serde::Serialize;

/// One direction of a TCP connection.
///
/// Ordering is lexicographic on (source IP, destination IP, source port,
/// destination port); addresses compare as their 32-bit integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    #[must_use]
    pub fn new(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
        }
    }

    /// Build a key from integer-form addresses.
    #[must_use]
    pub fn from_raw(src_ip: u32, dst_ip: u32, src_port: u16, dst_port: u16) -> Self {
        Self::new(
            Ipv4Addr::from(src_ip),
            Ipv4Addr::from(dst_ip),
            src_port,
            dst_port,
        )
    }

    /// The key of the opposite direction of the same connection.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self::new(self.dst_ip, self.src_ip, self.dst_port, self.src_port)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}
