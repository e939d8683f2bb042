//! Error types for wspipe
//!
//! This module defines all error types used throughout the wspipe crates.
//! Handshake failures are kept `Clone` so they can travel inside pipeline
//! events as well as in `Result`s.

#![allow(missing_docs)]

use crate::protocol::http_status;
use thiserror::Error;

/// Result type alias for wspipe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for wspipe operations
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Handshake errors
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(#[from] TimeoutError),

    /// Close errors
    #[error("Close error: {0}")]
    Close(#[from] CloseError),

    /// Stage chain errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),

    /// Invalid UTF-8 in text frame
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Connection is closing; the write was discarded
    #[error("Connection closing, {0} frame discarded")]
    Closed(&'static str),
}

/// Malformed HTTP traffic seen by the codecs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Invalid HTTP message framing
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Header block exceeded the configured bound
    #[error("HTTP header block too large: more than {max} bytes")]
    HeadersTooLarge { max: usize },

    /// Invalid header value
    #[error("Invalid header value for {header}: {value}")]
    InvalidHeaderValue { header: String, value: String },
}

/// Upgrade negotiation failures, on either side of the connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Request method is not GET
    #[error("not a WebSocket handshake request: invalid method {0}")]
    InvalidMethod(String),

    /// Request path does not match the endpoint
    #[error("not a WebSocket handshake request: path {path} does not match {expected}")]
    PathMismatch { path: String, expected: String },

    /// `Upgrade` header absent or not `websocket`
    #[error("not a WebSocket handshake request: missing upgrade")]
    MissingUpgrade,

    /// `Connection` header absent or without the `Upgrade` token
    #[error("not a WebSocket handshake request: missing connection")]
    MissingConnection,

    /// No usable client key
    #[error("not a WebSocket request: missing key")]
    MissingKey,

    /// Legacy key could not be turned into a challenge number
    #[error("not a WebSocket request: invalid key {0}")]
    InvalidKey(String),

    /// Strict subprotocol negotiation found no common protocol
    #[error("not a WebSocket request: no supported subprotocol in {offered}")]
    SubprotocolMismatch { offered: String },

    /// `Sec-WebSocket-Version` not understood
    #[error("unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),

    /// Client side: response status was not 101
    #[error("invalid handshake response status: {0}")]
    UnexpectedStatus(u16),

    /// Client side: response `Upgrade` header mismatch
    #[error("invalid handshake response upgrade: {0}")]
    InvalidUpgrade(String),

    /// Client side: response `Connection` header mismatch
    #[error("invalid handshake response connection: {0}")]
    InvalidConnection(String),

    /// Client side: accept token mismatch
    #[error("invalid challenge, actual: {received}, expected: {expected}")]
    InvalidAcceptKey { expected: String, received: String },

    /// Client side: server selected a subprotocol that was never offered
    #[error("invalid subprotocol, actual: {actual}, expected one of: {offered}")]
    UnexpectedSubprotocol { actual: String, offered: String },

    /// Transport went away before the handshake finished
    #[error("connection closed while handshake in progress")]
    ConnectionClosed,
}

impl HandshakeError {
    /// HTTP status the server answers this failure with
    pub fn http_status(&self) -> u16 {
        match self {
            HandshakeError::UnsupportedVersion(_) => http_status::UPGRADE_REQUIRED,
            _ => http_status::BAD_REQUEST,
        }
    }

    /// Whether the failure was detected while validating a server response
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            HandshakeError::UnexpectedStatus(_)
                | HandshakeError::InvalidUpgrade(_)
                | HandshakeError::InvalidConnection(_)
                | HandshakeError::InvalidAcceptKey { .. }
                | HandshakeError::UnexpectedSubprotocol { .. }
        )
    }
}

/// Frame parsing and processing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Insufficient data to parse frame
    #[error("Insufficient data: need {needed} bytes, have {have}")]
    InsufficientData { needed: usize, have: usize },

    /// Frame too large
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Invalid frame header
    #[error("Invalid frame header: {0}")]
    InvalidHeader(String),

    /// Invalid masking
    #[error("Invalid masking: {0}")]
    InvalidMasking(String),

    /// Invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Reserved bits set
    #[error("Reserved bits set in frame")]
    ReservedBitsSet,

    /// Control frames cannot be fragmented
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Continuation without a started message, or a new message inside one
    #[error("Invalid fragmentation: {0}")]
    InvalidFragmentation(String),

    /// Close frame payload is malformed
    #[error("Invalid close frame: {0}")]
    InvalidClose(#[from] CloseError),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Timeout errors
#[derive(Error, Debug, Clone)]
pub enum TimeoutError {
    /// Handshake did not finish in time
    #[error("Handshake timeout: {timeout:?}")]
    Handshake { timeout: std::time::Duration },
}

/// Close errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloseError {
    /// Invalid close code
    #[error("Invalid close code: {code}")]
    InvalidCode { code: u16 },

    /// Close payload of a single byte
    #[error("Close payload too short: {len} byte")]
    Truncated { len: usize },

    /// Close reason too long
    #[error("Close reason too long: {len} bytes (max: {max})")]
    ReasonTooLong { len: usize, max: usize },

    /// UTF-8 error in close reason
    #[error("Invalid UTF-8 in close reason")]
    InvalidUtf8,
}

/// Stage chain errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A mutation referenced a stage name that is not in the chain
    #[error("No stage named {0} in the pipeline")]
    StageNotFound(String),

    /// A stage name is already taken
    #[error("Duplicate stage name: {0}")]
    DuplicateName(String),

    /// A write reached the transport with a message it cannot carry
    #[error("Unencoded {0} message reached the transport")]
    Unencoded(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_messages() {
        assert_eq!(
            HandshakeError::MissingUpgrade.to_string(),
            "not a WebSocket handshake request: missing upgrade"
        );
        assert_eq!(
            HandshakeError::MissingConnection.to_string(),
            "not a WebSocket handshake request: missing connection"
        );
        assert_eq!(
            HandshakeError::MissingKey.to_string(),
            "not a WebSocket request: missing key"
        );
    }

    #[test]
    fn test_handshake_error_status() {
        assert_eq!(HandshakeError::MissingKey.http_status(), 400);
        assert_eq!(
            HandshakeError::UnsupportedVersion("9".into()).http_status(),
            426
        );
        assert!(HandshakeError::UnexpectedStatus(400).is_mismatch());
        assert!(!HandshakeError::MissingUpgrade.is_mismatch());
    }

    #[test]
    fn test_error_display() {
        let err = Error::from(HandshakeError::MissingKey);
        assert!(err.to_string().contains("missing key"));
    }
}
