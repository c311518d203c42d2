//! Streaming frame demultiplexer.
//!
//! The co-processor interleaves two kinds of traffic on one byte stream:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  ...OK\r\n  +IPD,128:<128 payload bytes>  \r\nCLOSED\r\n │
//! │  └control┘  └────────── framed payload ─┘  └─ control ─┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Framed payload is announced by an `+IPD,[<id>,]<len>:` header and runs
//! for exactly `len` bytes; everything else is control text, which is
//! watched for the connection-close marker. A `+` may also occur inside
//! payload-free control text, so header recognition is speculative: bytes
//! are held until the candidate resolves as a real header or not.

use log::{debug, trace};

use crate::error::{Error, LinkError, Result};
use crate::link::buffer::RingBuffer;
use crate::link::chunk::{CHUNK_SIZE, ChunkCodec};
use crate::link::scanner::{find, parse_decimal};
use crate::link::transport::Transport;
use crate::time::Clock;

/// Inbound payload buffered per session.
const RECV_BUFFER: usize = 4096;
const FRAME_PREFIX: &[u8] = b"+IPD,";
const CLOSE_MARKER: &[u8] = b"CLOSED\r\n";
/// Longest legal header: `+IPD,<id>,<len>:` with 4-digit length.
const MAX_HEADER: usize = 16;

/// One completed receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recv {
    /// Bytes copied into the caller's buffer.
    pub len: usize,
    /// Connection ordinal from the frame header, when in multiplexed mode.
    pub mux_id: Option<u8>,
}

enum ScanState {
    /// Outside any header candidate.
    ScanningPrefix,
    /// Bytes are being held as a possible frame header.
    MatchingHeader { started_ms: u64 },
}

enum FeedEvent {
    Consumed,
    Header,
    Closed,
}

/// Separates framed payload from control text, byte by byte.
pub struct FrameDemux {
    buffer: RingBuffer<RECV_BUFFER>,
    state: ScanState,
    /// Held bytes of an unresolved header candidate.
    pending: heapless::Vec<u8, MAX_HEADER>,
    /// Recent control text, scanned for the close marker.
    control: heapless::Vec<u8, MAX_HEADER>,
    /// Payload bytes still owed by the current frame.
    frame_len: i32,
    /// Total undelivered payload across buffered frames.
    frame_len_sum: i32,
    peer_closed: bool,
    mux_id: Option<u8>,
    /// Read-side staging for one transport record.
    chunk: [u8; CHUNK_SIZE],
    chunk_len: usize,
    chunk_pos: usize,
    header_timeout_ms: u64,
}

impl FrameDemux {
    pub fn new(header_timeout_ms: u64) -> Self {
        Self {
            buffer: RingBuffer::new(),
            state: ScanState::ScanningPrefix,
            pending: heapless::Vec::new(),
            control: heapless::Vec::new(),
            frame_len: 0,
            frame_len_sum: 0,
            peer_closed: false,
            mux_id: None,
            chunk: [0; CHUNK_SIZE],
            chunk_len: 0,
            chunk_pos: 0,
            header_timeout_ms,
        }
    }

    /// Reset all stream state for a fresh connection.
    pub fn begin_session(&mut self) {
        self.buffer.clear();
        self.state = ScanState::ScanningPrefix;
        self.pending.clear();
        self.control.clear();
        self.frame_len = 0;
        self.frame_len_sum = 0;
        self.peer_closed = false;
        self.mux_id = None;
        self.chunk_len = 0;
        self.chunk_pos = 0;
    }

    /// Whether the close marker has been seen on the control channel.
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Bytes buffered but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered payload and the frame accounting that goes with it,
    /// including the staged transport chunk — its remaining bytes were
    /// read under the old accounting and must not be re-fed as control
    /// text in a new epoch.
    pub fn discard_buffered(&mut self) {
        self.buffer.clear();
        self.frame_len = 0;
        self.frame_len_sum = 0;
        self.chunk_len = 0;
        self.chunk_pos = 0;
    }

    fn byte_pending<T: Transport>(&self, codec: &ChunkCodec<T>) -> bool {
        self.chunk_pos < self.chunk_len || codec.data_ready()
    }

    fn next_byte<T: Transport>(&mut self, codec: &mut ChunkCodec<T>) -> Result<Option<u8>> {
        if self.chunk_pos >= self.chunk_len {
            if !codec.data_ready() {
                return Ok(None);
            }
            let n = codec.read_block(&mut self.chunk)?;
            if n == 0 {
                return Ok(None);
            }
            self.chunk_len = n;
            self.chunk_pos = 0;
        }
        let b = self.chunk[self.chunk_pos];
        self.chunk_pos += 1;
        Ok(Some(b))
    }

    /// Route control text and watch for the close marker.
    fn route_control(&mut self, bytes: &[u8]) -> FeedEvent {
        for &b in bytes {
            // The marker starts with 'C'; restarting the window there keeps
            // a marker recognizable however the preceding text fell.
            if b == b'C' || self.control.is_full() {
                self.control.clear();
            }
            let _ = self.control.push(b);
        }
        if find(&self.control, CLOSE_MARKER).is_some() {
            debug!("demux: peer closed the connection");
            self.peer_closed = true;
            FeedEvent::Closed
        } else {
            FeedEvent::Consumed
        }
    }

    /// Try to read `+IPD,[<id>,]<len>:` out of the held bytes.
    fn parse_header(&self) -> Option<(Option<u8>, u32)> {
        let body = &self.pending[FRAME_PREFIX.len()..self.pending.len() - 1];
        let mut fields = body.split(|&b| b == b',');
        let first = parse_decimal(fields.next()?)?;
        match fields.next() {
            Some(second) => {
                if fields.next().is_some() || first > 4 {
                    return None;
                }
                let len = parse_decimal(second)?;
                (len > 0).then_some((Some(first as u8), len))
            }
            None => (first > 0).then_some((None, first)),
        }
    }

    /// The held bytes turned out not to be a header. While payload frames
    /// are outstanding they rejoin the payload stream (mirroring how the
    /// co-processor emits them); otherwise they are control text.
    fn flush_not_header(&mut self) -> Result<FeedEvent> {
        let mut held = [0u8; MAX_HEADER];
        let n = self.pending.len();
        held[..n].copy_from_slice(&self.pending);
        self.pending.clear();
        self.state = ScanState::ScanningPrefix;

        if self.frame_len_sum > 0 {
            self.buffer
                .put(&held[..n])
                .map_err(|_| Error::Link(LinkError::Overflow))?;
            Ok(FeedEvent::Consumed)
        } else {
            Ok(self.route_control(&held[..n]))
        }
    }

    fn feed(&mut self, b: u8, now_ms: u64) -> Result<FeedEvent> {
        // Inside a declared frame every byte is payload.
        if self.frame_len > 0 {
            self.buffer
                .put(&[b])
                .map_err(|_| Error::Link(LinkError::Overflow))?;
            self.frame_len -= 1;
            return Ok(FeedEvent::Consumed);
        }

        match self.state {
            ScanState::ScanningPrefix => {
                if b == b'+' {
                    self.pending.clear();
                    let _ = self.pending.push(b);
                    self.state = ScanState::MatchingHeader { started_ms: now_ms };
                    Ok(FeedEvent::Consumed)
                } else {
                    Ok(self.route_control(&[b]))
                }
            }
            ScanState::MatchingHeader { .. } => {
                let pos = self.pending.len();
                if self.pending.push(b).is_err() {
                    return self.flush_not_header();
                }
                if pos < FRAME_PREFIX.len() {
                    if b != FRAME_PREFIX[pos] {
                        return self.flush_not_header();
                    }
                    return Ok(FeedEvent::Consumed);
                }
                if b == b':' {
                    return match self.parse_header() {
                        Some((mux_id, len)) => {
                            trace!("demux: frame header, id={mux_id:?} len={len}");
                            self.frame_len = len as i32;
                            self.frame_len_sum += len as i32;
                            self.mux_id = mux_id;
                            self.pending.clear();
                            self.state = ScanState::ScanningPrefix;
                            Ok(FeedEvent::Header)
                        }
                        None => self.flush_not_header(),
                    };
                }
                if self.pending.is_full() {
                    return self.flush_not_header();
                }
                Ok(FeedEvent::Consumed)
            }
        }
    }

    /// Receive up to `out.len()` payload bytes.
    ///
    /// Returns as soon as the request is satisfied or every fully buffered
    /// frame has been delivered. `fresh_exchange` zeroes the frame ledger,
    /// which a command exchange on the shared channel invalidates.
    pub fn recv<T: Transport>(
        &mut self,
        codec: &mut ChunkCodec<T>,
        clock: &impl Clock,
        out: &mut [u8],
        timeout_ms: u64,
        fresh_exchange: bool,
    ) -> Result<Recv> {
        if out.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if fresh_exchange {
            self.frame_len = 0;
            self.frame_len_sum = 0;
            // Bytes staged before the exchange belong to the old epoch;
            // left in place they would resurface as control text.
            self.chunk_len = 0;
            self.chunk_pos = 0;
        }

        // Fast path: the request is already satisfiable from the buffer.
        if self.buffer.len() >= out.len() {
            let n = self.buffer.get(out);
            self.frame_len_sum -= n as i32;
            if self.frame_len_sum <= 0 {
                self.finish_stream();
                if self.peer_closed {
                    return Err(Error::EndOfStream);
                }
            }
            return Ok(Recv {
                len: n,
                mux_id: self.mux_id,
            });
        }

        let start = clock.now_ms();
        let mut saw_header = false;
        let mut peer_just_closed = false;
        loop {
            if self.peer_closed && !self.byte_pending(codec) {
                break;
            }
            let now = clock.now_ms();
            match self.next_byte(codec)? {
                Some(b) => {
                    match self.feed(b, now)? {
                        FeedEvent::Closed => {
                            peer_just_closed = true;
                            break;
                        }
                        FeedEvent::Header => saw_header = true,
                        FeedEvent::Consumed => {}
                    }
                    let size = self.buffer.len();
                    if size >= out.len() {
                        break;
                    }
                    // All declared payload is in: deliver rather than stall
                    // waiting for a frame that may never come.
                    if self.frame_len_sum > 0 && self.frame_len_sum as usize <= size {
                        break;
                    }
                }
                None => {
                    if let ScanState::MatchingHeader { started_ms } = self.state {
                        // A stalled candidate must not hold the stream
                        // hostage; force it to resolve as control text.
                        if now.wrapping_sub(started_ms) > self.header_timeout_ms {
                            if matches!(self.flush_not_header()?, FeedEvent::Closed) {
                                peer_just_closed = true;
                                break;
                            }
                        }
                    } else if timeout_ms == 0 || self.peer_closed {
                        break;
                    }
                }
            }
            if timeout_ms > 0
                && !matches!(self.state, ScanState::MatchingHeader { .. })
                && clock.now_ms().wrapping_sub(start) > timeout_ms
            {
                if saw_header {
                    break;
                }
                return Err(Error::Timeout);
            }
        }

        if self.buffer.is_empty() && !peer_just_closed && self.peer_closed {
            self.finish_stream();
            return Err(Error::PeerClosed);
        }

        let n = self.buffer.get(out);
        self.frame_len_sum -= n as i32;
        if self.frame_len_sum <= 0 || peer_just_closed {
            self.finish_stream();
            if peer_just_closed {
                return Err(Error::EndOfStream);
            }
        }
        Ok(Recv {
            len: n,
            mux_id: self.mux_id,
        })
    }

    /// The frame ledger is settled: drop leftovers so stray control bytes
    /// misrouted into the buffer cannot surface as payload later.
    fn finish_stream(&mut self) {
        self.frame_len = 0;
        self.frame_len_sum = 0;
        self.buffer.clear();
    }
}
