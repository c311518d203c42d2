//! Engine configuration parameters
//!
//! All tunable timeouts and limits for the AT engine. Defaults match the
//! ESP-AT firmware's documented response times.

use serde::{Deserialize, Serialize};

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Link ---
    /// Wait for the peer's handshake signal before each chunk (milliseconds)
    pub handshake_timeout_ms: u64,
    /// Force-resolve a partially matched `+IPD` header after this long (milliseconds)
    pub header_timeout_ms: u64,

    // --- Command exchanges ---
    /// Liveness probe (`AT`) response window (milliseconds)
    pub probe_timeout_ms: u64,
    /// Liveness probe attempts before reporting the link dead
    pub probe_attempts: u8,
    /// AP association (`AT+CWJAP`) response window (milliseconds)
    pub join_timeout_ms: u64,
    /// Connection open (`AT+CIPSTART`) response window (milliseconds)
    pub connect_timeout_ms: u64,
    /// Wait for the `>` send prompt (milliseconds)
    pub send_prompt_timeout_ms: u64,
    /// Wait for `SEND OK` after payload bytes (milliseconds)
    pub send_ack_timeout_ms: u64,
    /// DNS lookup (`AT+CIPDOMAIN`) response window (milliseconds)
    pub resolve_timeout_ms: u64,

    // --- Payload ---
    /// Largest single `AT+CIPSEND` segment (bytes)
    pub max_send_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Link
            handshake_timeout_ms: 1000,
            header_timeout_ms: 300,

            // Command exchanges
            probe_timeout_ms: 1000,
            probe_attempts: 3,
            join_timeout_ms: 20_000,
            connect_timeout_ms: 10_000,
            send_prompt_timeout_ms: 5000,
            send_ack_timeout_ms: 10_000,
            resolve_timeout_ms: 3000,

            // Payload
            max_send_len: 2048,
        }
    }
}
