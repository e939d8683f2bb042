//! Negotiated handshake results and their per-connection registry
//!
//! A [`Handshaker`] exists only for connections whose upgrade succeeded. It
//! remembers what was negotiated and knows which frame codec to install;
//! the [`HandshakerRegistry`] lets code outside the chain look it up by
//! connection.

use crate::codec::{
    LegacyFrameDecoder, LegacyFrameEncoder, Utf8FrameValidator, WebSocketFrameDecoder,
    WebSocketFrameEncoder,
};
use crate::config::HandshakeConfig;
use crate::pipeline::{ConnectionId, MutationBatch};
use crate::protocol::stage_names::{
    HTTP_DECODER, HTTP_ENCODER, UTF8_VALIDATOR, WS_DECODER, WS_ENCODER,
};
use crate::protocol::{Role, WebSocketVersion};
use http::HeaderMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a completed upgrade
#[derive(Debug, Clone)]
pub struct Handshaker {
    connection_id: ConnectionId,
    role: Role,
    version: WebSocketVersion,
    uri: String,
    subprotocol: Option<String>,
    request_headers: HeaderMap,
    response_headers: HeaderMap,
    config: Arc<HandshakeConfig>,
}

impl Handshaker {
    /// Record a completed upgrade
    pub fn new(
        connection_id: ConnectionId,
        role: Role,
        version: WebSocketVersion,
        uri: impl Into<String>,
        config: Arc<HandshakeConfig>,
    ) -> Self {
        Self {
            connection_id,
            role,
            version,
            uri: uri.into(),
            subprotocol: None,
            request_headers: HeaderMap::new(),
            response_headers: HeaderMap::new(),
            config,
        }
    }

    /// Set the negotiated subprotocol
    pub fn with_subprotocol(mut self, subprotocol: Option<String>) -> Self {
        self.subprotocol = subprotocol;
        self
    }

    /// Set the exchanged headers
    pub fn with_headers(mut self, request: HeaderMap, response: HeaderMap) -> Self {
        self.request_headers = request;
        self.response_headers = response;
        self
    }

    /// Connection the handshake belongs to
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Side of the connection this endpoint plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Negotiated protocol revision
    pub fn version(&self) -> WebSocketVersion {
        self.version
    }

    /// Request target of the upgrade
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Negotiated subprotocol
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Headers of the upgrade request
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Headers of the 101 response
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Largest frame payload the installed decoder accepts
    pub fn max_frame_payload_size(&self) -> usize {
        self.config.max_frame_payload_size
    }

    /// Configuration the handshake ran with
    pub fn config(&self) -> &Arc<HandshakeConfig> {
        &self.config
    }

    /// Append the mutations swapping the HTTP codec for the frame codec of
    /// the negotiated version, plus the UTF-8 validator when enabled
    pub fn install_codec(&self, batch: MutationBatch) -> MutationBatch {
        let max_payload = self.config.max_frame_payload_size;
        let batch = if self.version.uses_rfc6455_framing() {
            batch
                .replace(HTTP_ENCODER, WS_ENCODER, WebSocketFrameEncoder::new(self.role))
                .replace(
                    HTTP_DECODER,
                    WS_DECODER,
                    WebSocketFrameDecoder::new(
                        self.role,
                        max_payload,
                        self.config.allow_mask_mismatch,
                    ),
                )
        } else {
            batch
                .replace(HTTP_ENCODER, WS_ENCODER, LegacyFrameEncoder)
                .replace(HTTP_DECODER, WS_DECODER, LegacyFrameDecoder::new(max_payload))
        };

        if self.config.validate_utf8 {
            batch.add_after(WS_DECODER, UTF8_VALIDATOR, Utf8FrameValidator::new())
        } else {
            batch
        }
    }

    /// The full upgrade batch submitted by a handshake coordinator: the
    /// coordinator leaves the chain and the frame codec takes over
    pub fn upgrade_batch(&self) -> MutationBatch {
        self.install_codec(MutationBatch::new().remove_self())
    }
}

/// Concurrent map from connection to its completed handshake
#[derive(Debug, Clone, Default)]
pub struct HandshakerRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Arc<Handshaker>>>>,
}

impl HandshakerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the handshaker of its connection
    pub fn register(&self, handshaker: Arc<Handshaker>) {
        self.inner.write().insert(handshaker.connection_id(), handshaker);
    }

    /// Handshaker of a connection, if its upgrade completed
    pub fn get(&self, connection_id: ConnectionId) -> Option<Arc<Handshaker>> {
        self.inner.read().get(&connection_id).cloned()
    }

    /// Forget a connection
    pub fn remove(&self, connection_id: ConnectionId) -> Option<Arc<Handshaker>> {
        self.inner.write().remove(&connection_id)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no connection is registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
