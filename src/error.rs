//! Unified error types for the AT engine.
//!
//! Every subsystem converts into a single `Error` enum so callers see one
//! uniform taxonomy. All variants are `Copy` so they can be passed through
//! the socket layer without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Caller supplied a missing or zero-length output buffer.
    InvalidArgument,
    /// Deadline passed with no response marker or payload frame found.
    Timeout,
    /// The current frame is drained and the peer has closed the connection.
    EndOfStream,
    /// The peer closed the connection and nothing is buffered.
    PeerClosed,
    /// A block-transport fault.
    Link(LinkError),
    /// A command exchange completed but the co-processor rejected it or
    /// returned an unparseable response.
    Command(CommandError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Timeout => write!(f, "timed out"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::PeerClosed => write!(f, "peer closed"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Block-transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The peer never raised its handshake signal within the window.
    HandshakeTimeout,
    /// The underlying transport reported a read or write fault.
    Io,
    /// A receive buffer or scan window ran out of capacity.
    Overflow,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HandshakeTimeout => write!(f, "handshake timeout"),
            Self::Io => write!(f, "transport I/O fault"),
            Self::Overflow => write!(f, "buffer overflow"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Command-level errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The co-processor answered with an error marker (`ERROR`, `FAIL`, …).
    Rejected,
    /// The response arrived but a fixed-format field could not be parsed.
    Parse,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected by co-processor"),
            Self::Parse => write!(f, "malformed response field"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
