//! Frame decoding and TCP flow identification.
//!
//! This module turns raw captured Ethernet frames into normalized
//! [`PacketRecord`]s and extracts the 4-tuple [`FlowKey`] used to reassemble
//! each direction of a TCP connection.

mod flow_key;
mod frame;
mod timestamp;

pub use flow_key::FlowKey;
pub use frame::{DecodedFrame, Frame, MacAddr, PacketRecord, Protocol, decode};
pub use timestamp::{Timestamp, init_local_offset};

#[cfg(test)]
pub(crate) use frame::test_frames;
