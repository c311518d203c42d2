//! Scripted co-processor emulator.
//!
//! Speaks the slave side of the chunk protocol: answers `READ_STATUS`
//! probes with the length of the next queued message, serves it in
//! 64-byte `READ_DATA` records, reassembles written blocks, and can
//! auto-queue scripted replies whenever a write block completes. Backs
//! the unit and integration tests, and doubles as a stand-in transport
//! for host-side development with no co-processor attached.

use std::collections::VecDeque;

use crate::link::chunk::CHUNK_SIZE;
use crate::link::transport::Transport;

pub struct MockLink {
    /// Queued inbound (co-processor → host) messages.
    rx: VecDeque<Vec<u8>>,
    /// Message currently being served, with read offset.
    cur: Option<(Vec<u8>, usize)>,
    /// Bytes staged for the next `read_chunk`.
    staged: Option<Vec<u8>>,
    /// Write block being collected: declared length + bytes so far.
    collecting: Option<(usize, Vec<u8>)>,
    /// Completed write blocks, oldest first.
    pub written: Vec<Vec<u8>>,
    /// Reply groups queued automatically as write blocks complete; each
    /// part of a group arrives as its own transfer-visible message.
    script: VecDeque<Vec<Vec<u8>>>,
    /// Handshake level for outbound chunks (peer ready to receive).
    pub write_ready: bool,
    pub selected: bool,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            cur: None,
            staged: None,
            collecting: None,
            written: Vec::new(),
            script: VecDeque::new(),
            write_ready: true,
            selected: false,
        }
    }

    /// Queue inbound bytes as one transfer-visible message.
    pub fn push_data(&mut self, data: &[u8]) {
        self.rx.push_back(data.to_vec());
    }

    /// Queue a reply to be delivered after the next completed write.
    pub fn script_reply(&mut self, data: &[u8]) {
        self.script.push_back(vec![data.to_vec()]);
    }

    /// Queue several messages to arrive, in order, after the next
    /// completed write.
    pub fn script_replies(&mut self, parts: &[&[u8]]) {
        self.script
            .push_back(parts.iter().map(|p| p.to_vec()).collect());
    }

    pub fn written_text(&self) -> String {
        self.written
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockLink {
    type Error = ();

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), ()> {
        match data.first() {
            // WRITE_STATUS
            Some(1) => {
                let mut len = [0u8; 4];
                len.copy_from_slice(&data[1..5]);
                let len = u32::from_le_bytes(len) as usize;
                if len > 0 {
                    self.collecting = Some((len, Vec::new()));
                } else if let Some((declared, mut bytes)) = self.collecting.take() {
                    bytes.truncate(declared);
                    self.written.push(bytes);
                    if let Some(group) = self.script.pop_front() {
                        self.rx.extend(group);
                    }
                }
            }
            // WRITE_DATA
            Some(2) => {
                if let Some((_, bytes)) = &mut self.collecting {
                    bytes.extend_from_slice(&data[2..]);
                }
            }
            // READ_DATA
            Some(3) => {
                if let Some((msg, offset)) = &mut self.cur {
                    let mut chunk = vec![0u8; CHUNK_SIZE];
                    let n = (msg.len() - *offset).min(CHUNK_SIZE);
                    chunk[..n].copy_from_slice(&msg[*offset..*offset + n]);
                    *offset += n;
                    let done = *offset >= msg.len();
                    self.staged = Some(chunk);
                    if done {
                        self.cur = None;
                    }
                } else {
                    self.staged = Some(vec![0u8; CHUNK_SIZE]);
                }
            }
            // READ_STATUS
            Some(4) => {
                if self.cur.is_none() {
                    self.cur = self.rx.pop_front().map(|m| (m, 0));
                }
                let len = self.cur.as_ref().map_or(0, |(m, _)| m.len()) as u32;
                self.staged = Some(len.to_le_bytes().to_vec());
            }
            _ => {}
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let staged = self.staged.take().unwrap_or_default();
        let n = staged.len().min(buf.len());
        buf[..n].copy_from_slice(&staged[..n]);
        Ok(n)
    }

    fn data_ready(&self) -> bool {
        self.cur.is_some() || !self.rx.is_empty() || self.write_ready
    }

    fn select(&mut self, active: bool) {
        self.selected = active;
    }
}
