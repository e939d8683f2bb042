//! Messages flowing through the stage chain
//!
//! Raw bytes enter at the head, the HTTP codec turns them into aggregated
//! requests and responses, and after the upgrade the frame codec turns them
//! into [`Frame`]s. Every stage sees the same [`Message`] type and passes on
//! what it does not understand.

use crate::frame::Frame;
use crate::handshake::{HandshakeRequest, HandshakeResponse};
use bytes::Bytes;

/// A unit of data travelling through a pipeline
#[derive(Debug, Clone)]
pub enum Message {
    /// Raw transport bytes
    Bytes(Bytes),
    /// Aggregated HTTP request
    Request(HandshakeRequest),
    /// Aggregated HTTP response
    Response(HandshakeResponse),
    /// WebSocket frame
    Frame(Frame),
}

impl Message {
    /// Short kind name, used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Bytes(_) => "bytes",
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Frame(_) => "frame",
        }
    }

    /// The frame, if this message is one
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Message::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Take the frame out of the message
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Message::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Take the response out of the message
    pub fn into_response(self) -> Option<HandshakeResponse> {
        match self {
            Message::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Take the request out of the message
    pub fn into_request(self) -> Option<HandshakeRequest> {
        match self {
            Message::Request(request) => Some(request),
            _ => None,
        }
    }

    /// Take the bytes out of the message
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Message::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Message::Frame(frame)
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Message::Bytes(bytes)
    }
}

impl From<HandshakeRequest> for Message {
    fn from(request: HandshakeRequest) -> Self {
        Message::Request(request)
    }
}

impl From<HandshakeResponse> for Message {
    fn from(response: HandshakeResponse) -> Self {
        Message::Response(response)
    }
}
