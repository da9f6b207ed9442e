//! TCP stream reassembly across flows.
//!
//! `StreamReassembler` owns one [`StreamState`] per [`FlowKey`]. Each ingested
//! segment is ordered into its flow, and whenever the contiguous prefix grows
//! the complete HTTP messages at its front are handed to a [`MessageSink`].
//!
//! The first segment seen for a flow defines where the stream starts; there
//! is no handshake tracking. Sequence numbers are compared as plain integers,
//! so a flow whose sequence space wraps past 2^32 stops making progress.
//!
//! A reassembler is not synchronized and must only be driven from one thread.

use core::time::Duration;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use super::state::StreamState;
use crate::http;
use crate::packet::FlowKey;

/// Receives every complete message extracted from a flow.
pub trait MessageSink {
    fn message_complete(&mut self, flow: FlowKey, message: &[u8]);
}

impl<F: FnMut(FlowKey, &[u8])> MessageSink for F {
    fn message_complete(&mut self, flow: FlowKey, message: &[u8]) {
        self(flow, message);
    }
}

#[derive(Debug, Default)]
pub struct StreamReassembler {
    streams: HashMap<FlowKey, StreamState>,
}

impl StreamReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `flow` at a known sequence number. Has no effect on a
    /// flow that already exists.
    pub fn open_flow(&mut self, flow: FlowKey, initial_seq: u32) {
        self.open_flow_at(flow, initial_seq, Instant::now());
    }

    pub fn open_flow_at(&mut self, flow: FlowKey, initial_seq: u32, now: Instant) {
        self.streams
            .entry(flow)
            .or_insert_with(|| StreamState::new(initial_seq, now));
    }

    /// Add one segment's payload to `flow` and emit any messages it completes.
    pub fn ingest<S: MessageSink + ?Sized>(
        &mut self,
        flow: FlowKey,
        seq: u32,
        payload: &[u8],
        sink: &mut S,
    ) {
        self.ingest_at(flow, seq, payload, Instant::now(), sink);
    }

    /// [`ingest`](Self::ingest) with an explicit clock reading.
    pub fn ingest_at<S: MessageSink + ?Sized>(
        &mut self,
        flow: FlowKey,
        seq: u32,
        payload: &[u8],
        now: Instant,
        sink: &mut S,
    ) {
        if payload.is_empty() {
            return;
        }

        let stream = self.streams.entry(flow).or_insert_with(|| {
            debug!(%flow, seq, "Tracking new TCP stream");
            StreamState::new(seq, now)
        });
        stream.touch(now);
        stream.insert(seq, payload);

        if !stream.drain_pending() {
            return;
        }

        while http::looks_like_http(stream.assembled()) {
            let len = http::message_length(stream.assembled());
            if len == 0 || len > stream.assembled().len() {
                break;
            }
            let message = stream.take_front(len);
            sink.message_complete(flow, &message);
        }
    }

    /// Drop every flow idle for longer than `max_age`. Returns how many were
    /// removed.
    pub fn evict_idle(&mut self, max_age: Duration) -> usize {
        self.evict_idle_at(Instant::now(), max_age)
    }

    pub fn evict_idle_at(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.streams.len();
        self.streams.retain(|_, stream| !stream.is_stale(now, max_age));
        let evicted = before - self.streams.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.streams.len(), "Evicted idle streams");
        }
        evicted
    }

    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.streams.len()
    }

    /// Contiguous bytes of `flow` not yet consumed as messages.
    #[must_use]
    pub fn assembled(&self, flow: &FlowKey) -> Option<&[u8]> {
        self.streams.get(flow).map(StreamState::assembled)
    }

    #[must_use]
    pub fn expected_seq(&self, flow: &FlowKey) -> Option<u64> {
        self.streams.get(flow).map(StreamState::expected_seq)
    }

    #[must_use]
    pub fn pending_count(&self, flow: &FlowKey) -> Option<usize> {
        self.streams.get(flow).map(StreamState::pending_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::net::Ipv4Addr;

    #[derive(Default)]
    struct Collected(Vec<(FlowKey, Vec<u8>)>);

    impl MessageSink for Collected {
        fn message_complete(&mut self, flow: FlowKey, message: &[u8]) {
            self.0.push((flow, message.to_vec()));
        }
    }

    fn client_flow() -> FlowKey {
        FlowKey::new(
            Ipv4Addr::new(192, 168, 1, 100),
            Ipv4Addr::new(10, 0, 0, 1),
            40000,
            80,
        )
    }

    /// Every ordering of the items, used to check order independence.
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                result.push(tail);
            }
        }
        result
    }

    #[test]
    fn test_empty_payload_is_ignored() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();

        reassembler.ingest(client_flow(), 1, b"", &mut sink);
        assert_eq!(reassembler.flow_count(), 0);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_first_segment_defines_stream_start() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();

        reassembler.ingest(flow, 5000, b"hello", &mut sink);
        assert_eq!(reassembler.expected_seq(&flow), Some(5005));
        assert_eq!(reassembler.assembled(&flow), Some(b"hello".as_slice()));
    }

    #[test]
    fn test_out_of_order_segments_are_ordered() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();
        reassembler.open_flow(flow, 90);

        reassembler.ingest(flow, 100, b"BBBBBBBBBB", &mut sink);
        assert_eq!(reassembler.assembled(&flow), Some(b"".as_slice()));
        assert_eq!(reassembler.pending_count(&flow), Some(1));

        reassembler.ingest(flow, 90, b"AAAAAAAAAA", &mut sink);
        assert_eq!(
            reassembler.assembled(&flow),
            Some(b"AAAAAAAAAABBBBBBBBBB".as_slice())
        );
        assert_eq!(reassembler.expected_seq(&flow), Some(110));
        assert_eq!(reassembler.pending_count(&flow), Some(0));
    }

    #[test]
    fn test_assembly_is_independent_of_arrival_order() {
        let flow = client_flow();
        let stream: &[u8] = b"this stream is not http, so nothing is consumed";
        let segments: Vec<(u32, &[u8])> = vec![
            (7000, &stream[..10]),
            (7010, &stream[10..17]),
            (7017, &stream[17..30]),
            (7030, &stream[30..]),
        ];

        for order in permutations(&segments) {
            let mut reassembler = StreamReassembler::new();
            let mut sink = Collected::default();
            reassembler.open_flow(flow, 7000);

            for (seq, bytes) in order {
                reassembler.ingest(flow, seq, bytes, &mut sink);
            }

            assert_eq!(reassembler.assembled(&flow), Some(stream));
            assert!(sink.0.is_empty());
        }
    }

    #[test]
    fn test_out_of_order_http_message_is_emitted_once() {
        let flow = client_flow();
        let request: &[u8] = b"POST /upload HTTP/1.1\r\nContent-Length: 6\r\n\r\nabcdef";
        let segments: Vec<(u32, &[u8])> = vec![
            (1, &request[..8]),
            (9, &request[8..30]),
            (31, &request[30..47]),
            (48, &request[47..]),
        ];

        for order in permutations(&segments) {
            let mut reassembler = StreamReassembler::new();
            let mut sink = Collected::default();
            reassembler.open_flow(flow, 1);

            for (seq, bytes) in order {
                reassembler.ingest(flow, seq, bytes, &mut sink);
            }

            assert_eq!(sink.0.len(), 1);
            assert_eq!(sink.0[0], (flow, request.to_vec()));
            assert_eq!(reassembler.assembled(&flow), Some(b"".as_slice()));
        }
    }

    #[test]
    fn test_reingesting_a_segment_is_idempotent() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();

        reassembler.ingest(flow, 10, b"0123456789", &mut sink);
        reassembler.ingest(flow, 10, b"0123456789", &mut sink);
        reassembler.ingest(flow, 20, b"abc", &mut sink);
        reassembler.ingest(flow, 20, b"abc", &mut sink);

        assert_eq!(
            reassembler.assembled(&flow),
            Some(b"0123456789abc".as_slice())
        );
        assert_eq!(reassembler.pending_count(&flow), Some(0));
    }

    #[test]
    fn test_reingesting_a_consumed_message_does_not_repeat_it() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();
        let request = b"GET /x HTTP/1.1\r\nHost: a\r\n\r\n";

        reassembler.ingest(flow, 1, request, &mut sink);
        reassembler.ingest(flow, 1, request, &mut sink);

        assert_eq!(sink.0.len(), 1);
        assert_eq!(reassembler.assembled(&flow), Some(b"".as_slice()));
    }

    #[test]
    fn test_duplicate_pending_sequence_overwrites() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();
        reassembler.open_flow(flow, 0);

        reassembler.ingest(flow, 4, b"old!", &mut sink);
        reassembler.ingest(flow, 4, b"new!", &mut sink);
        reassembler.ingest(flow, 0, b"abcd", &mut sink);

        assert_eq!(reassembler.assembled(&flow), Some(b"abcdnew!".as_slice()));
    }

    #[test]
    fn test_stale_segment_is_dropped() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();

        reassembler.ingest(flow, 100, b"0123456789", &mut sink);
        reassembler.ingest(flow, 95, b"xxxxxxxxxx", &mut sink);

        assert_eq!(reassembler.assembled(&flow), Some(b"0123456789".as_slice()));
        assert_eq!(reassembler.pending_count(&flow), Some(0));
        assert_eq!(reassembler.expected_seq(&flow), Some(110));
    }

    #[test]
    fn test_pipelined_messages_in_one_segment() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();
        let first: &[u8] = b"GET /a HTTP/1.1\r\nHost: a\r\n\r\n";
        let second: &[u8] = b"GET /b HTTP/1.1\r\nHost: a\r\n\r\n";
        let third_head: &[u8] = b"GET /c HTTP/1.1\r\n";

        let payload = [first, second, third_head].concat();
        reassembler.ingest(flow, 1, &payload, &mut sink);

        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[0].1, first);
        assert_eq!(sink.0[1].1, second);
        assert_eq!(reassembler.assembled(&flow), Some(third_head));
    }

    #[test]
    fn test_message_waits_for_full_body() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow().reversed();
        let head: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";

        reassembler.ingest(flow, 1, head, &mut sink);
        reassembler.ingest(flow, 39, b"hel", &mut sink);
        assert!(sink.0.is_empty());

        reassembler.ingest(flow, 42, b"lo", &mut sink);
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].1, [head, b"hello".as_slice()].concat());
    }

    #[test]
    fn test_directions_reassemble_independently() {
        let mut reassembler = StreamReassembler::new();
        let mut messages = Vec::new();
        let mut sink = |flow: FlowKey, message: &[u8]| messages.push((flow, message.to_vec()));
        let request_flow = client_flow();
        let response_flow = request_flow.reversed();

        reassembler.ingest(request_flow, 1, b"GET / HTTP/1.1\r\n", &mut sink);
        reassembler.ingest(response_flow, 900, b"HTTP/1.1 204 No Content\r\n\r\n", &mut sink);
        reassembler.ingest(request_flow, 17, b"\r\n", &mut sink);
        drop(sink);

        assert_eq!(reassembler.flow_count(), 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, response_flow);
        assert_eq!(messages[1].0, request_flow);
        assert_eq!(messages[1].1, b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_non_http_bytes_block_extraction() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();

        reassembler.ingest(flow, 1, b"\x16\x03\x01 tls junk ", &mut sink);
        reassembler.ingest(flow, 14, b"GET / HTTP/1.1\r\n\r\n", &mut sink);

        assert!(sink.0.is_empty());
        assert_eq!(reassembler.assembled(&flow).map(<[u8]>::len), Some(31));
    }

    #[test]
    fn test_headers_without_content_length_leave_body_bytes() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow().reversed();
        let chunked: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";

        reassembler.ingest(flow, 1, chunked, &mut sink);

        // Only the header block is framed; the chunk bytes stay behind
        assert_eq!(sink.0.len(), 1);
        assert!(sink.0[0].1.ends_with(b"chunked\r\n\r\n"));
        assert_eq!(
            reassembler.assembled(&flow),
            Some(b"5\r\nhello\r\n0\r\n\r\n".as_slice())
        );
    }

    #[test]
    fn test_sequence_wraparound_stalls_stream() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let flow = client_flow();

        reassembler.ingest(flow, u32::MAX - 4, b"01234", &mut sink);
        assert_eq!(reassembler.expected_seq(&flow), Some(1 << 32));

        // The next segment wrapped to 0 and compares as stale
        reassembler.ingest(flow, 0, b"56789", &mut sink);
        assert_eq!(reassembler.assembled(&flow), Some(b"01234".as_slice()));
        assert_eq!(reassembler.expected_seq(&flow), Some(1 << 32));
        assert_eq!(reassembler.pending_count(&flow), Some(0));
    }

    #[test]
    fn test_evict_idle_streams() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let start = Instant::now();
        let old = client_flow();
        let recent = old.reversed();

        reassembler.ingest_at(old, 1, b"old", start, &mut sink);
        reassembler.ingest_at(recent, 1, b"recent", start + Duration::from_secs(2), &mut sink);

        let evicted =
            reassembler.evict_idle_at(start + Duration::from_secs(301), Duration::from_secs(300));

        assert_eq!(evicted, 1);
        assert_eq!(reassembler.assembled(&old), None);
        assert_eq!(reassembler.assembled(&recent), Some(b"recent".as_slice()));
    }

    #[test]
    fn test_activity_refreshes_idle_timer() {
        let mut reassembler = StreamReassembler::new();
        let mut sink = Collected::default();
        let start = Instant::now();
        let flow = client_flow();

        reassembler.ingest_at(flow, 1, b"a", start, &mut sink);
        reassembler.ingest_at(flow, 2, b"b", start + Duration::from_secs(200), &mut sink);

        assert_eq!(
            reassembler.evict_idle_at(start + Duration::from_secs(400), Duration::from_secs(300)),
            0
        );
        assert_eq!(reassembler.flow_count(), 1);
    }
}
