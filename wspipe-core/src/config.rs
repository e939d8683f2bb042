//! Handshake configuration
//!
//! One [`HandshakeConfig`] is built per endpoint and shared read-only, behind
//! an `Arc`, by the handshake coordinator, the close coordinator and the frame
//! codec they install.

use crate::close::CloseStatus;
use crate::error::{ConfigError, Error, Result};
use crate::path::PathMatch;
use crate::protocol::constants::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_FRAME_PAYLOAD, MAX_HEADER_SIZE,
};
use std::time::Duration;

/// Negotiation and close-handshake parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Endpoint path requests must address
    pub websocket_path: String,
    /// How the request path is compared with `websocket_path`
    pub path_match: PathMatch,
    /// Subprotocols, in preference order; `*` accepts whatever is offered
    pub subprotocols: Vec<String>,
    /// Fail the handshake when no subprotocol is shared
    pub require_subprotocol: bool,
    /// Largest accepted frame payload in bytes
    pub max_frame_payload_size: usize,
    /// Insert the UTF-8 validator after the frame decoder
    pub validate_utf8: bool,
    /// Time allowed for the handshake, `None` disables the timer
    pub handshake_timeout: Option<Duration>,
    /// Close frame sent when the transport is shut down locally without one
    pub send_close_frame: Option<CloseStatus>,
    /// Answer peer close frames instead of forwarding them to the application
    pub handle_close_frames: bool,
    /// Discard inbound pong frames
    pub drop_pong_frames: bool,
    /// Shut down if the peer does not answer a sent close frame in time
    pub force_close_timeout: Option<Duration>,
    /// Accept frames whose masking disagrees with the peer's role
    pub allow_mask_mismatch: bool,
    /// Largest HTTP header block accepted by the HTTP decoder
    pub max_header_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            websocket_path: "/".to_string(),
            path_match: PathMatch::Exact,
            subprotocols: Vec::new(),
            require_subprotocol: false,
            max_frame_payload_size: DEFAULT_MAX_FRAME_PAYLOAD,
            validate_utf8: true,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            send_close_frame: Some(CloseStatus::NORMAL_CLOSURE),
            handle_close_frames: true,
            drop_pong_frames: true,
            force_close_timeout: None,
            allow_mask_mismatch: false,
            max_header_size: MAX_HEADER_SIZE,
        }
    }
}

impl HandshakeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.websocket_path.starts_with('/') {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "websocket_path".to_string(),
                value: self.websocket_path.clone(),
            }));
        }

        if self.max_frame_payload_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_frame_payload_size must be greater than 0".to_string(),
            )));
        }

        if self.max_header_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_header_size must be greater than 0".to_string(),
            )));
        }

        if matches!(self.handshake_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(ConfigError::Validation(
                "handshake_timeout must be greater than 0".to_string(),
            )));
        }

        if matches!(self.force_close_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(ConfigError::Validation(
                "force_close_timeout must be greater than 0".to_string(),
            )));
        }

        if self.require_subprotocol && self.subprotocols.is_empty() {
            return Err(Error::Config(ConfigError::Validation(
                "require_subprotocol needs at least one subprotocol".to_string(),
            )));
        }

        if self.subprotocols.iter().any(|p| p.trim().is_empty() || p.contains(',')) {
            return Err(Error::Config(ConfigError::Validation(
                "subprotocols must be non-empty tokens".to_string(),
            )));
        }

        Ok(())
    }

    /// Set the endpoint path
    pub fn websocket_path(mut self, path: impl Into<String>) -> Self {
        self.websocket_path = path.into();
        self
    }

    /// Set the path-match policy
    pub fn path_match(mut self, mode: PathMatch) -> Self {
        self.path_match = mode;
        self
    }

    /// Add a subprotocol
    pub fn add_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Require a shared subprotocol
    pub fn require_subprotocol(mut self, required: bool) -> Self {
        self.require_subprotocol = required;
        self
    }

    /// Set the maximum frame payload size
    pub fn max_frame_payload_size(mut self, size: usize) -> Self {
        self.max_frame_payload_size = size;
        self
    }

    /// Enable or disable UTF-8 validation of text frames
    pub fn validate_utf8(mut self, enabled: bool) -> Self {
        self.validate_utf8 = enabled;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the close frame sent on local shutdown
    pub fn send_close_frame(mut self, status: Option<CloseStatus>) -> Self {
        self.send_close_frame = status;
        self
    }

    /// Answer or forward peer close frames
    pub fn handle_close_frames(mut self, handle: bool) -> Self {
        self.handle_close_frames = handle;
        self
    }

    /// Drop or forward inbound pong frames
    pub fn drop_pong_frames(mut self, drop: bool) -> Self {
        self.drop_pong_frames = drop;
        self
    }

    /// Set the forced shutdown delay after a sent close frame
    pub fn force_close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.force_close_timeout = timeout;
        self
    }

    /// Accept frames with unexpected masking
    pub fn allow_mask_mismatch(mut self, allow: bool) -> Self {
        self.allow_mask_mismatch = allow;
        self
    }

    /// Set the largest accepted HTTP header block
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandshakeConfig::default();
        assert_eq!(config.websocket_path, "/");
        assert_eq!(config.path_match, PathMatch::Exact);
        assert_eq!(config.max_frame_payload_size, 65536);
        assert!(config.validate_utf8);
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.send_close_frame, Some(CloseStatus::NORMAL_CLOSURE));
        assert!(config.handle_close_frames);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = HandshakeConfig::default()
            .websocket_path("/test")
            .path_match(PathMatch::Prefix)
            .add_subprotocol("chat")
            .send_close_frame(None)
            .validate_utf8(false);
        assert_eq!(config.websocket_path, "/test");
        assert_eq!(config.subprotocols, vec!["chat".to_string()]);
        assert_eq!(config.send_close_frame, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(HandshakeConfig::default().websocket_path("test").validate().is_err());
        assert!(HandshakeConfig::default().max_frame_payload_size(0).validate().is_err());
        assert!(HandshakeConfig::default()
            .handshake_timeout(Some(Duration::ZERO))
            .validate()
            .is_err());
        assert!(HandshakeConfig::default().require_subprotocol(true).validate().is_err());
        assert!(HandshakeConfig::default().add_subprotocol("a,b").validate().is_err());
    }
}
