//! Client configuration for wspipe
//!
//! This module provides configuration options for the client-side upgrade.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Uri};
use std::time::Duration;
use wspipe_core::close::CloseStatus;
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::{ConfigError, Error};

/// Client protocol configuration
#[derive(Debug, Clone)]
pub struct ClientProtocolConfig {
    /// Target of the upgrade, `ws://` or `wss://`
    pub uri: Uri,
    /// Negotiation and close-handshake parameters; `subprotocols` are offered
    /// to the server in order
    pub handshake: HandshakeConfig,
    /// Extra headers sent with the upgrade request
    pub custom_headers: HeaderMap,
    /// Send an `Origin` header derived from the URI unless one is set
    pub generate_origin_header: bool,
    /// Use the absolute URI as request target instead of the path
    pub absolute_upgrade_url: bool,
}

impl Default for ClientProtocolConfig {
    fn default() -> Self {
        Self {
            uri: Uri::from_static("ws://localhost/"),
            handshake: HandshakeConfig::default(),
            custom_headers: HeaderMap::new(),
            generate_origin_header: true,
            absolute_upgrade_url: false,
        }
    }
}

impl ClientProtocolConfig {
    /// Configuration connecting to `uri`
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> wspipe_core::Result<()> {
        self.handshake.validate()?;

        if !matches!(self.uri.scheme_str(), Some("ws") | Some("wss")) {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "uri".to_string(),
                value: self.uri.to_string(),
            }));
        }

        if self.uri.host().map_or(true, str::is_empty) {
            return Err(Error::Config(ConfigError::Validation(
                "uri must name a host".to_string(),
            )));
        }

        Ok(())
    }

    /// Whether the target uses TLS
    pub fn is_secure(&self) -> bool {
        self.uri.scheme_str() == Some("wss")
    }

    /// Port of the target, defaulting by scheme
    pub fn port(&self) -> u16 {
        self.uri
            .port_u16()
            .unwrap_or(if self.is_secure() { 443 } else { 80 })
    }

    /// Replace the whole handshake configuration
    pub fn handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Offer a subprotocol
    pub fn add_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.handshake = self.handshake.add_subprotocol(protocol);
        self
    }

    /// Add a header to the upgrade request
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.custom_headers.append(name, value);
        self
    }

    /// Enable or disable the generated `Origin` header
    pub fn generate_origin_header(mut self, generate: bool) -> Self {
        self.generate_origin_header = generate;
        self
    }

    /// Send the absolute URI as request target
    pub fn absolute_upgrade_url(mut self, absolute: bool) -> Self {
        self.absolute_upgrade_url = absolute;
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

    /// Answer peer close frames, or forward them to the application
    pub fn handle_close_frames(mut self, handle: bool) -> Self {
        self.handshake = self.handshake.handle_close_frames(handle);
        self
    }
}
