//! Response pattern scanner.
//!
//! Accumulates control-channel bytes into a window and watches for any of
//! a set of marker strings (`OK`, `ERROR`, the `>` send prompt, …). The
//! matched marker's index doubles as the command outcome ordinal.

use crate::error::{Error, LinkError, Result};
use crate::link::chunk::{CHUNK_SIZE, ChunkCodec};
use crate::link::transport::Transport;
use crate::time::Clock;

/// Upper bound on the accumulated response window.
const WINDOW_MAX: usize = 4096;

/// Substring search with a KMP failure table, so scanning the growing
/// window stays linear even on pathological self-similar responses.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let mut failure = vec![0usize; needle.len()];
    let mut k = 0;
    for i in 1..needle.len() {
        while k > 0 && needle[i] != needle[k] {
            k = failure[k - 1];
        }
        if needle[i] == needle[k] {
            k += 1;
        }
        failure[i] = k;
    }

    let mut matched = 0;
    for (i, &b) in haystack.iter().enumerate() {
        while matched > 0 && b != needle[matched] {
            matched = failure[matched - 1];
        }
        if b == needle[matched] {
            matched += 1;
        }
        if matched == needle.len() {
            return Some(i + 1 - needle.len());
        }
    }
    None
}

/// Parse an unsigned decimal field. Rejects empty input, non-digits, and
/// anything longer than eight digits so a garbled length cannot overflow.
pub(crate) fn parse_decimal(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
    }
    Some(value)
}

/// Accumulates response text and resolves it against marker sets.
pub struct ResponseScanner {
    window: Vec<u8>,
}

impl ResponseScanner {
    pub fn new() -> Self {
        Self {
            window: Vec::with_capacity(256),
        }
    }

    /// The raw bytes accumulated by the last wait or collect call.
    pub fn window(&self) -> &[u8] {
        &self.window
    }

    /// Drain the link until one of `targets` appears or `timeout_ms` passes.
    ///
    /// The window is cleared on entry; on success it holds everything read
    /// up to and including the match, and the returned index identifies
    /// which target fired.
    pub fn wait_for<T: Transport>(
        &mut self,
        codec: &mut ChunkCodec<T>,
        clock: &impl Clock,
        targets: &[&[u8]],
        timeout_ms: u64,
    ) -> Result<usize> {
        self.window.clear();
        let start = clock.now_ms();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            while codec.data_ready() {
                let n = codec.read_block(&mut chunk)?;
                if n == 0 {
                    break;
                }
                if self.window.len() + n > WINDOW_MAX {
                    return Err(Error::Link(LinkError::Overflow));
                }
                self.window.extend_from_slice(&chunk[..n]);
                // Check after every append so a marker followed by more
                // queued traffic still resolves promptly.
                if let Some(hit) = targets
                    .iter()
                    .position(|t| find(&self.window, t).is_some())
                {
                    return Ok(hit);
                }
            }
            if clock.now_ms().wrapping_sub(start) > timeout_ms {
                return Err(Error::Timeout);
            }
        }
    }

    /// Drain the link for a fixed duration, keeping everything read.
    ///
    /// Used for unsolicited traffic with no terminating marker, such as
    /// pushed subscription messages.
    pub fn collect_for<T: Transport>(
        &mut self,
        codec: &mut ChunkCodec<T>,
        clock: &impl Clock,
        duration_ms: u64,
    ) -> Result<()> {
        self.window.clear();
        let start = clock.now_ms();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            while codec.data_ready() {
                let n = codec.read_block(&mut chunk)?;
                if n == 0 {
                    break;
                }
                if self.window.len() + n > WINDOW_MAX {
                    return Err(Error::Link(LinkError::Overflow));
                }
                self.window.extend_from_slice(&chunk[..n]);
            }
            if clock.now_ms().wrapping_sub(start) > duration_ms {
                return Ok(());
            }
        }
    }

    /// Slice of the window strictly between the first `begin` and the next
    /// `end` after it.
    pub fn find_between(&self, begin: &[u8], end: &[u8]) -> Option<&[u8]> {
        let from = find(&self.window, begin)? + begin.len();
        let to = from + find(&self.window[from..], end)?;
        Some(&self.window[from..to])
    }
}

impl Default for ResponseScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockLink;
    use crate::time::testing::FakeClock;

    fn scripted(data: &[u8]) -> ChunkCodec<MockLink> {
        let mut link = MockLink::new();
        link.push_data(data);
        ChunkCodec::new(link, 1000)
    }

    #[test]
    fn find_basic() {
        assert_eq!(find(b"\r\nOK\r\n", b"OK"), Some(2));
        assert_eq!(find(b"\r\nERROR\r\n", b"OK"), None);
        assert_eq!(find(b"abc", b""), Some(0));
        assert_eq!(find(b"ab", b"abc"), None);
    }

    #[test]
    fn find_self_similar_needle() {
        // Needle with a repeated prefix exercises the failure table.
        assert_eq!(find(b"aabaabaaab", b"aabaaab"), Some(3));
    }

    #[test]
    fn first_matching_target_wins() {
        let clock = FakeClock::new(1);
        let mut codec = scripted(b"AT+TEST\r\n\r\nOK\r\n");
        let mut scanner = ResponseScanner::new();
        let hit = scanner
            .wait_for(&mut codec, &clock, &[b"OK", b"ERROR"], 1000)
            .unwrap();
        assert_eq!(hit, 0);
        assert!(scanner.window().ends_with(b"OK\r\n"));
    }

    #[test]
    fn error_marker_reports_its_ordinal() {
        let clock = FakeClock::new(1);
        let mut codec = scripted(b"\r\nERROR\r\n");
        let mut scanner = ResponseScanner::new();
        let hit = scanner
            .wait_for(&mut codec, &clock, &[b"OK", b"ERROR"], 1000)
            .unwrap();
        assert_eq!(hit, 1);
    }

    #[test]
    fn marker_split_across_chunks() {
        // 63 filler bytes put "OK" astride the 64-byte record boundary.
        let clock = FakeClock::new(1);
        let mut data = vec![b'.'; 63];
        data.extend_from_slice(b"OK\r\n");
        let mut codec = scripted(&data);
        let mut scanner = ResponseScanner::new();
        assert_eq!(
            scanner.wait_for(&mut codec, &clock, &[b"OK"], 1000).unwrap(),
            0
        );
    }

    #[test]
    fn times_out_without_marker() {
        let clock = FakeClock::new(200);
        let mut link = MockLink::new();
        link.write_ready = false; // nothing pending, nothing coming
        let mut codec = ChunkCodec::new(link, 1000);
        let mut scanner = ResponseScanner::new();
        assert_eq!(
            scanner.wait_for(&mut codec, &clock, &[b"OK"], 500),
            Err(Error::Timeout)
        );
    }

    #[test]
    fn collect_for_surfaces_overflow() {
        let clock = FakeClock::new(1);
        let mut codec = scripted(&vec![b'x'; WINDOW_MAX + 64]);
        let mut scanner = ResponseScanner::new();
        assert_eq!(
            scanner.collect_for(&mut codec, &clock, 1000),
            Err(Error::Link(LinkError::Overflow))
        );
    }

    #[test]
    fn decimal_fields_are_bounded() {
        assert_eq!(parse_decimal(b"2048"), Some(2048));
        assert_eq!(parse_decimal(b"0"), Some(0));
        assert_eq!(parse_decimal(b""), None);
        assert_eq!(parse_decimal(b"12x"), None);
        assert_eq!(parse_decimal(b"999999999"), None);
    }

    #[test]
    fn find_between_extracts_body() {
        let clock = FakeClock::new(1);
        let mut codec = scripted(b"AT+GMR\r\r\nAT version:1.7.4.0\r\n\r\nOK\r\n");
        let mut scanner = ResponseScanner::new();
        scanner.wait_for(&mut codec, &clock, &[b"OK"], 1000).unwrap();
        let body = scanner.find_between(b"\r\r\n", b"\r\n\r\nOK").unwrap();
        assert_eq!(body, b"AT version:1.7.4.0");
    }
}
