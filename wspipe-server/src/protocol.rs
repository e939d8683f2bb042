//! Server chain installer
//!
//! [`WebSocketServerProtocol`] puts the HTTP codec, the handshake coordinator
//! and the close coordinator at the head end of a connection's pipeline.
//! Application stages go after them.

use crate::config::ServerProtocolConfig;
use crate::handshake::ServerHandshakeCoordinator;
use std::sync::Arc;
use wspipe_core::close_handshake::CloseHandshakeCoordinator;
use wspipe_core::codec::{HttpRequestDecoder, HttpResponseEncoder};
use wspipe_core::config::HandshakeConfig;
use wspipe_core::error::Result;
use wspipe_core::handshaker::{Handshaker, HandshakerRegistry};
use wspipe_core::pipeline::{ConnectionId, Pipeline};
use wspipe_core::protocol::stage_names::{HTTP_DECODER, HTTP_ENCODER, PROTOCOL, SERVER_HANDSHAKER};

/// Installs the server side of the protocol on new connections
#[derive(Debug, Clone)]
pub struct WebSocketServerProtocol {
    handshake: Arc<HandshakeConfig>,
    forward_unmatched_requests: bool,
    registry: HandshakerRegistry,
}

impl WebSocketServerProtocol {
    /// Validate `config` and build the installer
    pub fn new(config: ServerProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            handshake: Arc::new(config.handshake),
            forward_unmatched_requests: config.forward_unmatched_requests,
            registry: HandshakerRegistry::new(),
        })
    }

    /// Share an existing registry instead of a private one
    pub fn with_registry(mut self, registry: HandshakerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Insert the protocol stages in front of whatever `pipeline` holds
    pub fn install(&self, pipeline: &mut Pipeline) -> Result<()> {
        let close = CloseHandshakeCoordinator::new(self.handshake.clone())
            .with_registry(self.registry.clone());
        let handshaker = ServerHandshakeCoordinator::new(self.handshake.clone(), self.registry.clone())
            .forward_unmatched_requests(self.forward_unmatched_requests);

        pipeline.add_first(PROTOCOL, close)?;
        pipeline.add_first(SERVER_HANDSHAKER, handshaker)?;
        pipeline.add_first(HTTP_DECODER, HttpRequestDecoder::new(self.handshake.max_header_size))?;
        pipeline.add_first(HTTP_ENCODER, HttpResponseEncoder)?;
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

    /// Handshake configuration shared by the installed stages
    pub fn config(&self) -> &Arc<HandshakeConfig> {
        &self.handshake
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wspipe_core::stage::Stage;

    struct App;

    impl Stage for App {}

    #[test]
    fn test_install_order() {
        let protocol = WebSocketServerProtocol::new(ServerProtocolConfig::default()).unwrap();
        let mut pipeline = Pipeline::new();
        pipeline.add_last("app", App).unwrap();
        protocol.install(&mut pipeline).unwrap();
        assert_eq!(
            pipeline.names(),
            vec![HTTP_ENCODER, HTTP_DECODER, SERVER_HANDSHAKER, PROTOCOL, "app"]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ServerProtocolConfig::new("no-slash");
        assert!(WebSocketServerProtocol::new(config).is_err());
    }

    #[test]
    fn test_install_twice_fails() {
        let protocol = WebSocketServerProtocol::new(ServerProtocolConfig::default()).unwrap();
        let mut pipeline = protocol.new_pipeline().unwrap();
        assert!(protocol.install(&mut pipeline).is_err());
    }
}
