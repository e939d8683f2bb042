//! Events delivered through the stage chain

use crate::close::CloseStatus;
use crate::error::HandshakeError;
use crate::protocol::WebSocketVersion;
use http::HeaderMap;

/// Payload of [`PipelineEvent::HandshakeComplete`]
#[derive(Debug, Clone)]
pub struct HandshakeComplete {
    /// Negotiated protocol revision
    pub version: WebSocketVersion,
    /// Request target of the upgrade request
    pub request_uri: String,
    /// Headers of the upgrade request
    pub request_headers: HeaderMap,
    /// Headers of the 101 response
    pub response_headers: HeaderMap,
    /// Selected subprotocol, if any
    pub subprotocol: Option<String>,
}

/// Out-of-band notification travelling from head to tail
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The upgrade finished and the frame codec is installed
    HandshakeComplete(HandshakeComplete),
    /// The handshake did not finish within the configured timeout
    HandshakeTimeout,
    /// The handshake was rejected or the server response did not verify
    HandshakeFailed(HandshakeError),
    /// The peer sent a close frame that was answered by the close handshake
    CloseReceived(Option<CloseStatus>),
    /// A decoder rejected inbound data; the close handshake answers with this
    /// status and shuts the transport down
    ProtocolViolation(CloseStatus),
    /// Application-defined event
    User(String),
}

impl PipelineEvent {
    /// Short kind name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::HandshakeComplete(_) => "handshake-complete",
            PipelineEvent::HandshakeTimeout => "handshake-timeout",
            PipelineEvent::HandshakeFailed(_) => "handshake-failed",
            PipelineEvent::CloseReceived(_) => "close-received",
            PipelineEvent::ProtocolViolation(_) => "protocol-violation",
            PipelineEvent::User(_) => "user",
        }
    }
}
