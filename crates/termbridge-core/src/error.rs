//! Error types for termbridge.

use thiserror::Error;

/// Main error type for termbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No mount point was available when the surface tried to attach
    #[error("Attachment error: {0}")]
    Attachment(String),

    /// The connection factory could not produce a transport for the target
    #[error("Connect failure for {target}: {reason}")]
    ConnectFailure {
        /// Target the session was opened for
        target: String,
        /// Human-readable cause
        reason: String,
    },

    /// The transport reported an error or refused an operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation attempted on a transport that is no longer open
    #[error("Transport is closed")]
    TransportClosed,

    /// The surface already has its single input handler
    #[error("Input handler already registered")]
    InputHandlerRegistered,

    /// A session was opened twice
    #[error("Session already started (state: {0})")]
    SessionAlreadyStarted(String),

    /// Invalid terminal dimensions
    #[error("Invalid dimensions: {rows}x{cols}")]
    InvalidDimensions {
        /// Number of rows
        rows: u16,
        /// Number of columns
        cols: u16,
    },

    /// Unknown named key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The task driving a session stopped unexpectedly
    #[error("Session driver failed: {0}")]
    Driver(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
