//! # Error Types
//!
//! Custom error types for mavviz using `thiserror`.

use thiserror::Error;

/// Main error type for mavviz
#[derive(Debug, Error)]
pub enum MavvizError {
    /// No vehicle heartbeat arrived on the active link in time
    #[error("No heartbeat from {address} within {timeout_ms} ms")]
    HandshakeTimeout { address: String, timeout_ms: u64 },

    /// A single outbound frame could not be delivered
    #[error("Transport send failed: {0}")]
    TransportSend(String),

    /// The link can no longer receive or send
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Connection string could not be parsed
    #[error("Invalid link address: {0}")]
    InvalidAddress(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for mavviz
pub type Result<T> = std::result::Result<T, MavvizError>;
