//! Property-based tests for the byte-level machinery: ring buffer
//! accounting, pattern search, and the frame demultiplexer.

mod common;

use proptest::collection::vec;
use proptest::prelude::*;
use std::collections::VecDeque;

use atlink::config::EngineConfig;
use atlink::link::buffer::RingBuffer;
use atlink::link::scanner::find;
use atlink::link::{ChunkCodec, FrameDemux};

use common::{FakeClock, MockLink};

fn naive_find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

proptest! {
    /// The KMP search agrees with the obvious quadratic one.
    #[test]
    fn find_matches_naive_search(
        haystack in vec(any::<u8>(), 0..200),
        needle in vec(any::<u8>(), 0..8),
    ) {
        prop_assert_eq!(find(&haystack, &needle), naive_find(&haystack, &needle));
    }

    /// Every byte put into the ring buffer comes back out, in order,
    /// against a VecDeque model.
    #[test]
    fn ring_buffer_matches_model(ops in vec((any::<bool>(), vec(any::<u8>(), 0..40)), 0..50)) {
        let mut rb: RingBuffer<64> = RingBuffer::new();
        let mut model: VecDeque<u8> = VecDeque::new();

        for (is_put, data) in ops {
            if is_put {
                let fits = model.len() + data.len() <= 64;
                let res = rb.put(&data);
                prop_assert_eq!(res.is_ok(), fits);
                if fits {
                    model.extend(&data);
                }
            } else {
                let mut out = vec![0u8; data.len()];
                let n = rb.get(&mut out);
                prop_assert_eq!(n, data.len().min(model.len()));
                for byte in &out[..n] {
                    prop_assert_eq!(Some(*byte), model.pop_front());
                }
            }
            prop_assert_eq!(rb.len(), model.len());
        }
    }

    /// A well-formed stream of frames separated by control chatter delivers
    /// exactly the frame payloads, in order, whatever the read granularity.
    #[test]
    fn demux_delivers_frame_payloads_exactly(
        frames in vec(vec(any::<u8>(), 1..50), 1..6),
        chatter in "[a-bd-z0-9 ]{0,10}",
        out_len in 1usize..64,
    ) {
        let mut stream = Vec::new();
        for payload in &frames {
            stream.extend_from_slice(chatter.as_bytes());
            stream.extend_from_slice(format!("+IPD,{}:", payload.len()).as_bytes());
            stream.extend_from_slice(payload);
        }

        let mut link = MockLink::new();
        link.push_data(&stream);
        let mut codec = ChunkCodec::new(link, 1000);
        let mut demux = FrameDemux::new(EngineConfig::default().header_timeout_ms);
        let clock = FakeClock::new(1);

        let mut delivered = Vec::new();
        let mut out = vec![0u8; out_len];
        let mut first = true;
        loop {
            let r = demux.recv(&mut codec, &clock, &mut out, 0, first).unwrap();
            first = false;
            if r.len == 0 {
                break;
            }
            delivered.extend_from_slice(&out[..r.len]);
        }

        let expected: Vec<u8> = frames.concat();
        prop_assert_eq!(delivered, expected);
    }

    /// Arbitrary garbage must never panic the demultiplexer; any outcome
    /// short of that (timeouts, overflow errors, empty reads) is fine.
    #[test]
    fn demux_survives_arbitrary_bytes(stream in vec(any::<u8>(), 0..500)) {
        let mut link = MockLink::new();
        link.push_data(&stream);
        let mut codec = ChunkCodec::new(link, 1000);
        let mut demux = FrameDemux::new(50);
        let clock = FakeClock::new(1);

        let mut out = [0u8; 32];
        for _ in 0..64 {
            match demux.recv(&mut codec, &clock, &mut out, 0, false) {
                Ok(r) if r.len == 0 => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
    }
}
