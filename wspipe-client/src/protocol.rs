//! Client chain installer

use crate::config::ClientProtocolConfig;
use crate::handshake::ClientHandshakeCoordinator;
use std::sync::Arc;
use wspipe_core::close_handshake::CloseHandshakeCoordinator;
use wspipe_core::codec::{HttpRequestEncoder, HttpResponseDecoder};
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::Result;
use wspipe_core::handshaker::{Handshaker, HandshakerRegistry};
use wspipe_core::pipeline::{ConnectionId, Pipeline};
use wspipe_core::protocol::stage_names::{CLIENT_HANDSHAKER, HTTP_DECODER, HTTP_ENCODER, PROTOCOL};

/// Installs the client side of the protocol on new connections
#[derive(Debug, Clone)]
pub struct WebSocketClientProtocol {
    config: Arc<ClientProtocolConfig>,
    handshake: Arc<HandshakeConfig>,
    registry: HandshakerRegistry,
    key: Option<String>,
}

impl WebSocketClientProtocol {
    /// Validate `config` and build the installer
    pub fn new(config: ClientProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            handshake: Arc::new(config.handshake.clone()),
            config: Arc::new(config),
            registry: HandshakerRegistry::new(),
            key: None,
        })
    }

    /// Share an existing registry instead of a private one
    pub fn with_registry(mut self, registry: HandshakerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Offer a fixed `Sec-WebSocket-Key` instead of a random one per connection
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Insert the protocol stages in front of whatever `pipeline` holds
    pub fn install(&self, pipeline: &mut Pipeline) -> Result<()> {
        let close = CloseHandshakeCoordinator::new(self.handshake.clone())
            .with_registry(self.registry.clone());
        let mut handshaker = ClientHandshakeCoordinator::new(
            self.config.clone(),
            self.handshake.clone(),
            self.registry.clone(),
        );
        if let Some(key) = &self.key {
            handshaker = handshaker.with_key(key.clone());
        }

        pipeline.add_first(PROTOCOL, close)?;
        pipeline.add_first(
            HTTP_DECODER,
            HttpResponseDecoder::new(self.handshake.max_header_size),
        )?;
        pipeline.add_first(HTTP_ENCODER, HttpRequestEncoder)?;
        // last, so an already active pipeline sends the request through the encoder
        pipeline.add_after(HTTP_DECODER, CLIENT_HANDSHAKER, handshaker)?;
        Ok(())
    }

    /// Fresh pipeline holding only the protocol stages
    pub fn new_pipeline(&self) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();
        self.install(&mut pipeline)?;
        Ok(pipeline)
    }

    /// Handshake of a connection whose upgrade completed
    pub fn handshaker(&self, connection_id: ConnectionId) -> Option<Arc<Handshaker>> {
        self.registry.get(connection_id)
    }

    /// Registry of completed handshakes
    pub fn registry(&self) -> &HandshakerRegistry {
        &self.registry
    }

    /// Configuration of the installed stages
    pub fn config(&self) -> &Arc<ClientProtocolConfig> {
        &self.config
    }

    /// Handshake settings shared by every stage this installer adds
    pub fn handshake_config(&self) -> &Arc<HandshakeConfig> {
        &self.handshake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Uri;

    #[test]
    fn test_install_order() {
        let config = ClientProtocolConfig::new(Uri::from_static("ws://localhost/ws"));
        let protocol = WebSocketClientProtocol::new(config).unwrap();
        let pipeline = protocol.new_pipeline().unwrap();
        assert_eq!(
            pipeline.names(),
            vec![HTTP_ENCODER, HTTP_DECODER, CLIENT_HANDSHAKER, PROTOCOL]
        );
    }

    #[test]
    fn test_invalid_uri_rejected() {
        let config = ClientProtocolConfig::new(Uri::from_static("ftp://localhost/"));
        assert!(WebSocketClientProtocol::new(config).is_err());
    }
}
