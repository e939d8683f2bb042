//! Codec stages
//!
//! The HTTP codec carries the upgrade exchange; the frame codec (RFC 6455 or
//! legacy) replaces it once the handshake completes.

pub mod frame;
pub mod http;
pub mod legacy;
pub mod utf8;

pub use frame::{WebSocketFrameDecoder, WebSocketFrameEncoder};
pub use http::{HttpRequestDecoder, HttpRequestEncoder, HttpResponseDecoder, HttpResponseEncoder};
pub use legacy::{LegacyFrameDecoder, LegacyFrameEncoder};
pub use utf8::Utf8FrameValidator;
