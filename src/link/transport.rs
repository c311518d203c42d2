//! Transport abstraction — the raw channel to the co-processor.
//!
//! Concrete implementations:
//! - SPI block-transfer link (chip-select + handshake GPIO)
//! - UART byte stream (handshake derived from RX FIFO level)
//!
//! The engine is generic over `Transport`, so adding a new medium
//! requires zero changes to the protocol logic.

/// Chunked byte channel with a "data ready" side signal.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Write one raw chunk (a status header or a data record).
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read one raw chunk into `buf`.
    /// Returns the number of bytes actually read.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Whether the peer signals pending data / readiness (handshake line).
    fn data_ready(&self) -> bool;

    /// Assert or release the guard/select line around one exchange.
    fn select(&mut self, active: bool);
}

/// A null transport that discards all writes and never reads.
/// Useful as a default when no co-processor is attached.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn write_chunk(&mut self, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn read_chunk(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn data_ready(&self) -> bool {
        false
    }

    fn select(&mut self, _active: bool) {}
}
