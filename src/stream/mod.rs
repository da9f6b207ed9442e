//! TCP stream reassembly.
//!
//! This module reorders the segments of each TCP flow into a contiguous byte
//! stream and cuts complete HTTP messages off its front as they become
//! available.

mod reassembler;
mod state;

pub use reassembler::{MessageSink, StreamReassembler};
