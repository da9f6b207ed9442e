//! Per-flow reassembly state.
//!
//! This module provides the `StreamState` struct which orders the segments of
//! a single TCP flow by sequence number and accumulates the contiguous prefix
//! until complete HTTP messages can be extracted from it.

use core::time::Duration;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub(crate) struct StreamState {
    /// Next contiguous sequence number the stream needs. Held wider than the
    /// 32-bit sequence space so it can only move forward.
    expected_seq: u64,
    /// Segments that arrived ahead of their turn, keyed by start sequence.
    pending: BTreeMap<u32, Vec<u8>>,
    assembled: Vec<u8>,
    last_activity: Instant,
}

impl StreamState {
    pub(crate) fn new(initial_seq: u32, now: Instant) -> Self {
        Self {
            expected_seq: u64::from(initial_seq),
            pending: BTreeMap::new(),
            assembled: Vec::new(),
            last_activity: now,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Queue a segment. A second segment with the same start sequence
    /// replaces the first; overlapping payloads are not merged.
    pub(crate) fn insert(&mut self, seq: u32, payload: &[u8]) {
        self.pending.insert(seq, payload.to_vec());
    }

    /// Move every segment that continues the stream into the assembled
    /// buffer, dropping segments that start before `expected_seq`. Returns
    /// whether any bytes were appended.
    pub(crate) fn drain_pending(&mut self) -> bool {
        let mut appended = false;

        while let Some(entry) = self.pending.first_entry() {
            let seq = u64::from(*entry.key());
            if seq == self.expected_seq {
                let data = entry.remove();
                self.expected_seq += data.len() as u64;
                self.assembled.extend_from_slice(&data);
                appended = true;
            } else if seq < self.expected_seq {
                let data = entry.remove();
                debug!(
                    seq,
                    len = data.len(),
                    expected = self.expected_seq,
                    "Dropping stale segment"
                );
            } else {
                // Gap: wait for the missing segment
                break;
            }
        }

        appended
    }

    pub(crate) fn assembled(&self) -> &[u8] {
        &self.assembled
    }

    /// Remove and return the first `len` assembled bytes.
    pub(crate) fn take_front(&mut self, len: usize) -> Vec<u8> {
        self.assembled.drain(..len).collect()
    }

    pub(crate) fn expected_seq(&self) -> u64 {
        self.expected_seq
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > timeout
    }
}
