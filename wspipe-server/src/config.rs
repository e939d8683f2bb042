//! Server configuration
//!
//! This module provides configuration options for the server-side upgrade.

use std::time::Duration;
use wspipe_core::close::CloseStatus;
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::{ConfigError, Error};
use wspipe_core::path::PathMatch;

/// Server protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerProtocolConfig {
    /// Negotiation and close-handshake parameters
    pub handshake: HandshakeConfig,
    /// Pass requests for other paths downstream instead of rejecting them
    pub forward_unmatched_requests: bool,
}

impl ServerProtocolConfig {
    /// Configuration serving the endpoint at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self::default().websocket_path(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> wspipe_core::Result<()> {
        self.handshake.validate()?;

        if self.forward_unmatched_requests
            && self.handshake.websocket_path == "/"
            && self.handshake.path_match == PathMatch::Prefix
        {
            return Err(Error::Config(ConfigError::Validation(
                "forward_unmatched_requests has no effect with prefix path /".to_string(),
            )));
        }

        Ok(())
    }

    /// Replace the whole handshake configuration
    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Set the endpoint path
    pub fn websocket_path(mut self, path: impl Into<String>) -> Self {
        self.handshake = self.handshake.websocket_path(path);
        self
    }

    /// Set the path comparison mode
    pub fn path_match(mut self, mode: PathMatch) -> Self {
        self.handshake = self.handshake.path_match(mode);
        self
    }

    /// Add a supported subprotocol
    pub fn add_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.handshake = self.handshake.add_subprotocol(protocol);
        self
    }

    /// Fail the upgrade when the client offers none of the subprotocols
    pub fn require_subprotocol(mut self, required: bool) -> Self {
        self.handshake = self.handshake.require_subprotocol(required);
        self
    }

    /// Set the largest accepted frame payload
    pub fn max_frame_payload_size(mut self, size: usize) -> Self {
        self.handshake = self.handshake.max_frame_payload_size(size);
        self
    }

    /// Enable or disable UTF-8 validation of text messages
    pub fn validate_utf8(mut self, enabled: bool) -> Self {
        self.handshake = self.handshake.validate_utf8(enabled);
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake = self.handshake.handshake_timeout(timeout);
        self
    }

    /// Set the close frame sent on local shutdown
    pub fn send_close_frame(mut self, status: Option<CloseStatus>) -> Self {
        self.handshake = self.handshake.send_close_frame(status);
        self
    }

    /// Forward requests for other paths downstream
    pub fn forward_unmatched_requests(mut self, forward: bool) -> Self {
        self.forward_unmatched_requests = forward;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerProtocolConfig::default();
        assert_eq!(config.handshake.websocket_path, "/");
        assert!(!config.forward_unmatched_requests);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerProtocolConfig::new("/chat")
            .path_match(PathMatch::Prefix)
            .add_subprotocol("chat.v1")
            .validate_utf8(false)
            .forward_unmatched_requests(true);
        assert_eq!(config.handshake.websocket_path, "/chat");
        assert_eq!(config.handshake.path_match, PathMatch::Prefix);
        assert_eq!(config.handshake.subprotocols, vec!["chat.v1".to_string()]);
        assert!(!config.handshake.validate_utf8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = ServerProtocolConfig::default().max_frame_payload_size(0);
        assert!(config.validate().is_err());

        let config = ServerProtocolConfig::new("/")
            .path_match(PathMatch::Prefix)
            .forward_unmatched_requests(true);
        assert!(matches!(
            config.validate(),
            Err(Error::Config(ConfigError::Validation(_)))
        ));
    }
}
