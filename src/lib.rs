//! AT-command protocol engine for ESP-AT serial WiFi co-processors.
//!
//! The co-processor multiplexes command responses, unsolicited `+IPD`
//! payload frames and close notifications onto one half-duplex byte
//! stream. This crate separates them again:
//!
//! - [`link::chunk::ChunkCodec`] — 64-byte block transfer atop the raw
//!   [`link::transport::Transport`] capability.
//! - [`link::scanner::ResponseScanner`] — matches response markers
//!   (`OK`, `ERROR`, …) within a timeout.
//! - [`link::demux::FrameDemux`] — streams `+IPD` payload out of the
//!   mixed inbound stream, detecting peer close.
//! - [`engine::CommandEngine`] — the AT request/response catalog
//!   (station/AP, TCP/UDP, MQTT relay).
//! - [`socket::Socket`] — POSIX-flavoured facade over one connection.
//!
//! The engine is transport-agnostic: SPI block-transfer links and plain
//! UART byte streams both implement [`link::transport::Transport`].

#![deny(unused_must_use)]

pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod socket;
pub mod time;

pub use error::{Error, Result};
