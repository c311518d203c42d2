//! BSD-style socket facade over the command engine.
//!
//! Presents blocking `connect`/`send`/`recv`/`close` with errno-like
//! errors, hiding the AT exchanges underneath. One socket per engine: the
//! co-processor's single-connection mode carries exactly one stream.

use core::fmt;

use embedded_hal::delay::DelayNs;

use crate::engine::{CommandEngine, ConnKind};
use crate::error::Error;
use crate::link::Transport;
use crate::time::Clock;

/// Errno-shaped failures surfaced to socket callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// The link or connection failed underneath the socket.
    BrokenPipe,
    /// The operation did not complete within the socket timeout.
    TimedOut,
    /// The peer has closed the connection.
    NotConnected,
    /// No data available right now (non-blocking read).
    WouldBlock,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BrokenPipe => write!(f, "broken pipe"),
            Self::TimedOut => write!(f, "timed out"),
            Self::NotConnected => write!(f, "not connected"),
            Self::WouldBlock => write!(f, "would block"),
        }
    }
}

impl From<Error> for SocketError {
    fn from(e: Error) -> Self {
        match e {
            Error::Timeout => Self::TimedOut,
            Error::EndOfStream => Self::WouldBlock,
            Error::PeerClosed => Self::NotConnected,
            _ => Self::BrokenPipe,
        }
    }
}

/// Blocking stream socket over the single co-processor connection.
pub struct Socket<T: Transport, C: Clock, D: DelayNs> {
    engine: CommandEngine<T, C, D>,
    timeout_ms: u64,
    /// The next read follows a command exchange, so the frame ledger from
    /// before the exchange is stale.
    fresh_exchange: bool,
}

impl<T: Transport, C: Clock, D: DelayNs> Socket<T, C, D> {
    pub fn new(engine: CommandEngine<T, C, D>) -> Self {
        Self {
            engine,
            timeout_ms: 5000,
            fresh_exchange: true,
        }
    }

    /// Per-operation timeout; 0 makes `recv` non-blocking.
    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    /// Access the engine for out-of-band operations (Wi-Fi management,
    /// liveness checks) between socket calls.
    pub fn engine_mut(&mut self) -> &mut CommandEngine<T, C, D> {
        &mut self.engine
    }

    pub fn connect(&mut self, kind: ConnKind, host: &str, port: u16) -> Result<(), SocketError> {
        self.engine.connect(kind, host, port)?;
        self.fresh_exchange = true;
        Ok(())
    }

    pub fn send(&mut self, data: &[u8]) -> Result<(), SocketError> {
        if self.engine.peer_closed() {
            return Err(SocketError::NotConnected);
        }
        // The send exchange floods the control channel; payload buffered
        // before it can no longer be attributed to a frame.
        self.engine.discard_buffered();
        self.engine.send(data)?;
        self.fresh_exchange = true;
        Ok(())
    }

    /// Receive into `out`, blocking up to the socket timeout.
    pub fn recv(&mut self, out: &mut [u8]) -> Result<usize, SocketError> {
        let fresh = core::mem::take(&mut self.fresh_exchange);
        let n = self.engine.recv(out, self.timeout_ms, fresh)?;
        if n == 0 {
            return Err(SocketError::WouldBlock);
        }
        Ok(n)
    }

    /// Resolve `host` through the co-processor's DNS client.
    pub fn gethostbyname(&mut self, host: &str) -> Result<[u8; 4], SocketError> {
        self.fresh_exchange = true;
        Ok(self.engine.resolve(host)?)
    }

    pub fn close(&mut self) -> Result<(), SocketError> {
        // Closing an already-closed connection reports ERROR; the socket
        // is done with it either way.
        let _ = self.engine.close();
        self.fresh_exchange = true;
        Ok(())
    }
}
