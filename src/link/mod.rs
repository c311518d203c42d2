//! Link layer: everything between the raw transport and the command engine.
//!
//! ```text
//! ┌───────────────┐   64-byte records   ┌────────────┐   bytes   ┌────────────┐
//! │   Transport   │ ──────────────────▶ │ ChunkCodec │ ────────▶ │ FrameDemux │
//! │ (SPI / UART)  │ ◀────────────────── │            │           │  Scanner   │
//! └───────────────┘                     └────────────┘           └────────────┘
//! ```

pub mod buffer;
pub mod chunk;
pub mod demux;
pub mod mock;
pub mod scanner;
pub mod transport;

pub use chunk::{CHUNK_SIZE, ChunkCodec};
pub use demux::{FrameDemux, Recv};
pub use scanner::ResponseScanner;
pub use transport::{NullTransport, Transport};
