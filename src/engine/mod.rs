//! AT command engine.
//!
//! Owns the link layer and drives request/response exchanges with the
//! co-processor. One engine per co-processor; the network operations live
//! in [`net`], Wi-Fi management in [`wifi`], and the MQTT client commands
//! in [`mqtt`].

pub mod mqtt;
pub mod net;
pub mod wifi;

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{CommandError, Error, Result};
use crate::link::{ChunkCodec, FrameDemux, ResponseScanner, Transport};
use crate::time::Clock;

pub use net::{ConnKind, TransferMode};
pub use wifi::{ApInfo, IpConfig, WifiMode};

/// Command engine over one co-processor link.
pub struct CommandEngine<T: Transport, C: Clock, D: DelayNs> {
    codec: ChunkCodec<T>,
    scanner: ResponseScanner,
    demux: FrameDemux,
    clock: C,
    delay: D,
    config: EngineConfig,
    multi_conn: bool,
    /// Stored body of the last listing command (`AT+CWLAP`, `AT+MQTTSUB?`),
    /// consumed item by item by the `*_next` accessors.
    listing: Vec<u8>,
    listing_pos: usize,
}

impl<T: Transport, C: Clock, D: DelayNs> CommandEngine<T, C, D> {
    pub fn new(transport: T, clock: C, delay: D, config: EngineConfig) -> Self {
        Self {
            codec: ChunkCodec::new(transport, config.handshake_timeout_ms),
            scanner: ResponseScanner::new(),
            demux: FrameDemux::new(config.header_timeout_ms),
            clock,
            delay,
            config,
            multi_conn: false,
            listing: Vec::new(),
            listing_pos: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &T {
        &self.codec.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.codec.transport
    }

    /// Whether the peer has closed the active connection.
    pub fn peer_closed(&self) -> bool {
        self.demux.peer_closed()
    }

    /// Drop any payload buffered for the caller.
    pub fn discard_buffered(&mut self) {
        self.demux.discard_buffered();
    }

    // ─── Core exchange ────────────────────────────────────────────────────

    /// Issue one command line and wait for the first of `targets`.
    ///
    /// Anything the peer had queued beforehand is drained first so a stale
    /// response cannot satisfy this exchange. Returns the ordinal of the
    /// matched target.
    pub(crate) fn exchange(
        &mut self,
        cmd: &str,
        targets: &[&[u8]],
        timeout_ms: u64,
    ) -> Result<usize> {
        self.codec.drain()?;
        debug!("engine: >> {cmd}");
        let mut line = String::with_capacity(cmd.len() + 2);
        line.push_str(cmd);
        line.push_str("\r\n");
        self.codec.write_block(&self.clock, line.as_bytes())?;
        self.scanner
            .wait_for(&mut self.codec, &self.clock, targets, timeout_ms)
    }

    /// Exchange expecting a plain `OK`/`ERROR` outcome.
    pub(crate) fn simple_cmd(&mut self, cmd: &str, timeout_ms: u64) -> Result<()> {
        match self.exchange(cmd, &[b"OK", b"ERROR"], timeout_ms)? {
            0 => Ok(()),
            _ => Err(CommandError::Rejected.into()),
        }
    }

    // ─── Liveness and bring-up ────────────────────────────────────────────

    /// Check the co-processor answers `AT`, retrying a few times since the
    /// first exchange after power-up routinely gets lost.
    pub fn probe(&mut self) -> Result<()> {
        let attempts = self.config.probe_attempts;
        let timeout = self.config.probe_timeout_ms;
        for attempt in 1..=attempts {
            match self.exchange("AT", &[b"OK"], timeout) {
                Ok(_) => return Ok(()),
                Err(e) => warn!("engine: probe {attempt}/{attempts} failed: {e}"),
            }
        }
        Err(Error::Timeout)
    }

    /// Soft-reset the co-processor and wait for it to come back.
    pub fn reset(&mut self) -> Result<()> {
        info!("engine: resetting co-processor");
        self.simple_cmd("AT+RST", self.config.probe_timeout_ms)?;
        self.delay.delay_ms(2000);
        // Boot chatter arrives at an unpredictable baud-looking garble;
        // keep probing until a clean OK comes through.
        let start = self.clock.now_ms();
        loop {
            if self.exchange("AT", &[b"OK"], 100).is_ok() {
                break;
            }
            if self.clock.now_ms().wrapping_sub(start) > 3000 {
                return Err(Error::Timeout);
            }
        }
        self.delay.delay_ms(1500);
        Ok(())
    }

    /// Firmware identification string from `AT+GMR`.
    pub fn firmware_version(&mut self) -> Result<heapless::String<128>> {
        self.exchange("AT+GMR", &[b"OK", b"ERROR"], self.config.probe_timeout_ms)?;
        let body = self
            .scanner
            .find_between(b"\r\r\n", b"\r\n\r\nOK")
            .ok_or(CommandError::Parse)?;
        let text = core::str::from_utf8(body).map_err(|_| CommandError::Parse)?;
        let mut out = heapless::String::new();
        out.push_str(text).map_err(|_| CommandError::Parse)?;
        Ok(out)
    }

    /// Command echo on the control channel (`ATE1`/`ATE0`).
    pub fn set_echo(&mut self, on: bool) -> Result<()> {
        let cmd = if on { "ATE1" } else { "ATE0" };
        self.simple_cmd(cmd, self.config.probe_timeout_ms)
    }

    /// Standard bring-up: probe, silence echo, set the Wi-Fi mode, select
    /// normal transfer with single-connection routing, and drop any
    /// association left over from before the reset.
    pub fn init(&mut self, mode: WifiMode) -> Result<()> {
        self.probe()?;
        self.set_echo(false)?;
        self.set_wifi_mode(mode)?;
        self.set_transfer_mode(TransferMode::Normal)?;
        self.set_multi_conn(false)?;
        self.leave_ap()?;
        info!("engine: link initialized, mode {mode:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockLink;
    use crate::time::testing::{FakeClock, NoopDelay};

    fn engine(link: MockLink) -> CommandEngine<MockLink, FakeClock, NoopDelay> {
        CommandEngine::new(link, FakeClock::new(1), NoopDelay, EngineConfig::default())
    }

    #[test]
    fn probe_succeeds_on_scripted_ok() {
        let mut link = MockLink::new();
        link.script_reply(b"AT\r\n\r\nOK\r\n");
        let mut e = engine(link);
        e.probe().unwrap();
        assert_eq!(e.codec.transport.written_text(), "AT\r\n");
    }

    #[test]
    fn probe_retries_then_gives_up() {
        let clock = FakeClock::new(600);
        let mut e = CommandEngine::new(
            MockLink::new(),
            clock,
            NoopDelay,
            EngineConfig::default(),
        );
        assert_eq!(e.probe(), Err(Error::Timeout));
        // One AT line per attempt.
        assert_eq!(e.codec.transport.written.len(), 3);
    }

    #[test]
    fn simple_cmd_maps_error_marker() {
        let mut link = MockLink::new();
        link.script_reply(b"\r\nERROR\r\n");
        let mut e = engine(link);
        assert_eq!(
            e.simple_cmd("AT+CWQAP", 1000),
            Err(Error::Command(CommandError::Rejected))
        );
    }

    #[test]
    fn firmware_version_extracts_body() {
        let mut link = MockLink::new();
        link.script_reply(b"AT+GMR\r\r\nAT version:1.7.4.0\r\nSDK version:3.0.4\r\n\r\nOK\r\n");
        let mut e = engine(link);
        let v = e.firmware_version().unwrap();
        assert_eq!(v.as_str(), "AT version:1.7.4.0\r\nSDK version:3.0.4");
    }

    #[test]
    fn echo_command_polarity() {
        let mut link = MockLink::new();
        link.script_reply(b"\r\nOK\r\n");
        link.script_reply(b"\r\nOK\r\n");
        let mut e = engine(link);
        e.set_echo(false).unwrap();
        e.set_echo(true).unwrap();
        assert_eq!(e.codec.transport.written_text(), "ATE0\r\nATE1\r\n");
    }
}
