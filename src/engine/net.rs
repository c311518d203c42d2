//! Connection management and payload transfer.
//!
//! Outbound payload rides `AT+CIPSEND` (prompt, raw bytes, `SEND OK`);
//! inbound payload comes back through the frame demultiplexer. Up to five
//! concurrent connections are supported in multiplexed mode.

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use crate::engine::CommandEngine;
use crate::error::{CommandError, Result};
use crate::link::scanner::parse_decimal;
use crate::link::{Recv, Transport};
use crate::time::Clock;

/// Transport protocol for an outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnKind {
    Tcp,
    Udp,
}

impl ConnKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

/// Payload routing mode for `AT+CIPMODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Normal = 0,
    Transparent = 1,
}

impl<T: Transport, C: Clock, D: DelayNs> CommandEngine<T, C, D> {
    // ─── Connection routing ───────────────────────────────────────────────

    /// Switch between single-connection and multiplexed routing.
    ///
    /// The firmware refuses to switch while a connection is open.
    pub fn set_multi_conn(&mut self, enable: bool) -> Result<()> {
        let cmd = format!("AT+CIPMUX={}", u8::from(enable));
        match self.exchange(
            &cmd,
            &[b"OK", b"Link is builded"],
            self.config.probe_timeout_ms,
        )? {
            0 => {
                self.multi_conn = enable;
                Ok(())
            }
            _ => Err(CommandError::Rejected.into()),
        }
    }

    pub fn multi_conn(&self) -> bool {
        self.multi_conn
    }

    // ─── Open / close ─────────────────────────────────────────────────────

    /// Open the single connection to `host:port`.
    pub fn connect(&mut self, kind: ConnKind, host: &str, port: u16) -> Result<()> {
        let cmd = format!("AT+CIPSTART=\"{}\",\"{host}\",{port}", kind.as_str());
        self.connect_inner(&cmd, host, port)
    }

    /// Open connection `id` (0..=4) in multiplexed mode.
    pub fn connect_mux(&mut self, id: u8, kind: ConnKind, host: &str, port: u16) -> Result<()> {
        let cmd = format!("AT+CIPSTART={id},\"{}\",\"{host}\",{port}", kind.as_str());
        self.connect_inner(&cmd, host, port)
    }

    fn connect_inner(&mut self, cmd: &str, host: &str, port: u16) -> Result<()> {
        info!("net: connecting to {host}:{port}");
        // "ALREADY CONNECT" precedes ERROR so that the combined
        // "ALREADY CONNECT ... ERROR" response resolves as the former.
        match self.exchange(
            cmd,
            &[b"OK", b"ALREADY CONNECT", b"ERROR"],
            self.config.connect_timeout_ms,
        )? {
            0 | 1 => {
                self.demux.begin_session();
                Ok(())
            }
            _ => Err(CommandError::Rejected.into()),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.simple_cmd("AT+CIPCLOSE", 5000)
    }

    /// Close connection `id`. "link is not" means it was already gone,
    /// which is as closed as it gets.
    pub fn close_mux(&mut self, id: u8) -> Result<()> {
        let cmd = format!("AT+CIPCLOSE={id}");
        match self.exchange(&cmd, &[b"OK", b"link is not", b"ERROR"], 5000)? {
            0 | 1 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    /// Connection state ordinal from `AT+CIPSTATUS` (2 = got IP,
    /// 3 = connected, 4 = disconnected, 5 = not joined).
    pub fn connection_status(&mut self) -> Result<u8> {
        self.exchange("AT+CIPSTATUS", &[b"OK", b"ERROR"], 5000)?;
        let body = self
            .scanner
            .find_between(b"STATUS:", b"\r\n")
            .ok_or(CommandError::Parse)?;
        parse_decimal(body)
            .map(|v| v as u8)
            .ok_or(CommandError::Parse.into())
    }

    // ─── Send ─────────────────────────────────────────────────────────────

    /// Send payload on the single connection, splitting into segments the
    /// firmware will accept.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let max = self.config.max_send_len;
        for segment in data.chunks(max) {
            let cmd = format!("AT+CIPSEND={}", segment.len());
            self.send_segment(&cmd, segment)?;
        }
        Ok(())
    }

    /// Send payload on connection `id` in multiplexed mode.
    pub fn send_mux(&mut self, id: u8, data: &[u8]) -> Result<()> {
        let max = self.config.max_send_len;
        for segment in data.chunks(max) {
            let cmd = format!("AT+CIPSEND={id},{}", segment.len());
            self.send_segment(&cmd, segment)?;
        }
        Ok(())
    }

    fn send_segment(&mut self, cmd: &str, segment: &[u8]) -> Result<()> {
        debug!("net: sending {} byte segment", segment.len());
        self.exchange(cmd, &[b">"], self.config.send_prompt_timeout_ms)?;
        self.codec.write_block(&self.clock, segment)?;
        match self.scanner.wait_for(
            &mut self.codec,
            &self.clock,
            &[b"SEND OK", b"SEND FAIL", b"ERROR"],
            self.config.send_ack_timeout_ms,
        )? {
            0 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    // ─── Receive ──────────────────────────────────────────────────────────

    /// Receive payload from the single connection.
    ///
    /// `fresh_exchange` must be true on the first read after a command
    /// exchange, whose control traffic invalidates the frame ledger.
    pub fn recv(&mut self, out: &mut [u8], timeout_ms: u64, fresh_exchange: bool) -> Result<usize> {
        self.demux
            .recv(&mut self.codec, &self.clock, out, timeout_ms, fresh_exchange)
            .map(|r| r.len)
    }

    /// Receive from whichever connection has data, reporting its id.
    pub fn recv_any(
        &mut self,
        out: &mut [u8],
        timeout_ms: u64,
        fresh_exchange: bool,
    ) -> Result<Recv> {
        self.demux
            .recv(&mut self.codec, &self.clock, out, timeout_ms, fresh_exchange)
    }

    /// Receive from connection `id`. A frame belonging to another
    /// connection is discarded and 0 is returned.
    pub fn recv_mux(
        &mut self,
        id: u8,
        out: &mut [u8],
        timeout_ms: u64,
        fresh_exchange: bool,
    ) -> Result<usize> {
        let r = self
            .demux
            .recv(&mut self.codec, &self.clock, out, timeout_ms, fresh_exchange)?;
        if r.mux_id == Some(id) {
            Ok(r.len)
        } else {
            Ok(0)
        }
    }

    // ─── Server ───────────────────────────────────────────────────────────

    /// Start the TCP server. Multiplexed routing is a firmware
    /// prerequisite and is switched on if needed.
    pub fn start_server(&mut self, port: u16) -> Result<()> {
        if !self.multi_conn {
            self.set_multi_conn(true)?;
        }
        let cmd = format!("AT+CIPSERVER=1,{port}");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    /// Stop the TCP server. The firmware only fully releases the listener
    /// across a reset, so one is performed here.
    pub fn stop_server(&mut self) -> Result<()> {
        self.simple_cmd("AT+CIPSERVER=0", self.config.probe_timeout_ms)?;
        self.reset()
    }

    /// Idle disconnect window for server-side connections, in seconds.
    pub fn set_server_timeout(&mut self, seconds: u16) -> Result<()> {
        let cmd = format!("AT+CIPSTO={seconds}");
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    pub fn set_transfer_mode(&mut self, mode: TransferMode) -> Result<()> {
        let cmd = format!("AT+CIPMODE={}", mode as u8);
        self.simple_cmd(&cmd, self.config.probe_timeout_ms)
    }

    // ─── DNS ──────────────────────────────────────────────────────────────

    /// Resolve `host` to an IPv4 address via the co-processor's resolver.
    pub fn resolve(&mut self, host: &str) -> Result<[u8; 4]> {
        let cmd = format!("AT+CIPDOMAIN=\"{host}\"");
        if self.exchange(&cmd, &[b"OK", b"ERROR"], self.config.resolve_timeout_ms)? != 0 {
            return Err(CommandError::Rejected.into());
        }
        let body = self
            .scanner
            .find_between(b"+CIPDOMAIN:", b"\r\n")
            .ok_or(CommandError::Parse)?;
        // Newer firmware quotes the address.
        let body = body.strip_prefix(b"\"").unwrap_or(body);
        let body = body.strip_suffix(b"\"").unwrap_or(body);
        parse_ipv4(body).ok_or(CommandError::Parse.into())
    }
}

pub(crate) fn parse_ipv4(bytes: &[u8]) -> Option<[u8; 4]> {
    let mut out = [0u8; 4];
    let mut octets = bytes.split(|&b| b == b'.');
    for slot in &mut out {
        let v = parse_decimal(octets.next()?)?;
        *slot = u8::try_from(v).ok()?;
    }
    octets.next().is_none().then_some(out)
}
