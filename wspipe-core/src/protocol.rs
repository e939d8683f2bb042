//! WebSocket protocol constants and utilities
//!
//! This module contains the fundamental protocol definitions from RFC 6455,
//! the legacy version-00 header names, and the well-known stage names the
//! handshake coordinators use when they rewrite the stage chain.

use std::fmt;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Close frame
    Close = 0x8,
    /// Ping frame
    Ping = 0x9,
    /// Pong frame
    Pong = 0xA,
}

impl Opcode {
    /// Create an Opcode from a u8, `None` for reserved values
    pub fn from(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Get the numeric value of the opcode
    pub fn value(&self) -> u8 {
        *self as u8
    }

    /// Check if this is a control opcode
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this is a data opcode
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary | Opcode::Continuation)
    }

    /// Short lowercase name, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Continuation => "continuation",
            Opcode::Text => "text",
            Opcode::Binary => "binary",
            Opcode::Close => "close",
            Opcode::Ping => "ping",
            Opcode::Pong => "pong",
        }
    }
}

/// Negotiated WebSocket protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WebSocketVersion {
    /// hixie-76 / hybi-00, identified by the absence of a version header
    V00,
    /// hybi-07
    V07,
    /// hybi-08 to hybi-12
    V08,
    /// RFC 6455
    V13,
}

impl WebSocketVersion {
    /// Resolve the version from the `Sec-WebSocket-Version` header value
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None => Some(WebSocketVersion::V00),
            Some("7") => Some(WebSocketVersion::V07),
            Some("8") => Some(WebSocketVersion::V08),
            Some("13") => Some(WebSocketVersion::V13),
            Some(_) => None,
        }
    }

    /// Header value sent for this version, `None` for V00
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            WebSocketVersion::V00 => None,
            WebSocketVersion::V07 => Some("7"),
            WebSocketVersion::V08 => Some("8"),
            WebSocketVersion::V13 => Some("13"),
        }
    }

    /// Whether this version frames messages per RFC 6455
    pub fn uses_rfc6455_framing(&self) -> bool {
        !matches!(self, WebSocketVersion::V00)
    }
}

impl fmt::Display for WebSocketVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value().unwrap_or("0"))
    }
}

/// Endpoint role, decides masking direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts upgrade requests, sends unmasked frames
    Server,
    /// Issues upgrade requests, masks outbound frames
    Client,
}

/// WebSocket protocol constants
pub mod constants {
    use std::time::Duration;

    /// WebSocket protocol version
    pub const WEBSOCKET_VERSION: &str = "13";

    /// WebSocket magic string for accept calculation
    pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    /// Default maximum frame payload
    pub const DEFAULT_MAX_FRAME_PAYLOAD: usize = 65536;

    /// Default handshake timeout
    pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

    /// WebSocket key length in bytes
    pub const WEBSOCKET_KEY_LEN: usize = 16;

    /// Maximum header size
    pub const MAX_HEADER_SIZE: usize = 8192;

    /// Maximum number of headers parsed per message
    pub const MAX_HEADERS: usize = 64;

    /// Maximum control frame payload
    pub const MAX_CONTROL_PAYLOAD: usize = 125;

    /// Maximum close reason size
    pub const MAX_CLOSE_REASON_SIZE: usize = 123;

    /// Legacy challenge body length
    pub const LEGACY_CHALLENGE_LEN: usize = 8;
}

/// Frame header bit positions and masks
pub mod frame {
    /// FIN bit position
    pub const FIN_BIT: u8 = 0x80;

    /// RSV1 bit position
    pub const RSV1_BIT: u8 = 0x40;

    /// RSV2 bit position
    pub const RSV2_BIT: u8 = 0x20;

    /// RSV3 bit position
    pub const RSV3_BIT: u8 = 0x10;

    /// Opcode mask
    pub const OPCODE_MASK: u8 = 0x0F;

    /// MASK bit position
    pub const MASK_BIT: u8 = 0x80;

    /// Payload length mask for 7-bit length
    pub const PAYLOAD_LEN_MASK: u8 = 0x7F;

    /// Extended payload length (16-bit) marker
    pub const PAYLOAD_LEN_16: u8 = 126;

    /// Extended payload length (64-bit) marker
    pub const PAYLOAD_LEN_64: u8 = 127;
}

/// HTTP status codes used in WebSocket handshake
pub mod http_status {
    /// HTTP Switching Protocols status
    pub const SWITCHING_PROTOCOLS: u16 = 101;

    /// HTTP Bad Request status
    pub const BAD_REQUEST: u16 = 400;

    /// HTTP Upgrade Required status
    pub const UPGRADE_REQUIRED: u16 = 426;

    /// Reason phrase of the legacy 101 status line
    pub const LEGACY_SWITCHING_REASON: &str = "WebSocket Protocol Handshake";
}

/// Header names not covered by `http::header`
pub mod http_header {
    use http::HeaderName;

    /// First legacy challenge key
    pub const SEC_WEBSOCKET_KEY1: HeaderName = HeaderName::from_static("sec-websocket-key1");

    /// Second legacy challenge key
    pub const SEC_WEBSOCKET_KEY2: HeaderName = HeaderName::from_static("sec-websocket-key2");

    /// Legacy origin echo
    pub const SEC_WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("sec-websocket-origin");

    /// Legacy location echo
    pub const SEC_WEBSOCKET_LOCATION: HeaderName =
        HeaderName::from_static("sec-websocket-location");

    /// hixie-75 origin echo
    pub const WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("websocket-origin");

    /// hixie-75 location echo
    pub const WEBSOCKET_LOCATION: HeaderName = HeaderName::from_static("websocket-location");

    /// hixie-75 protocol header
    pub const WEBSOCKET_PROTOCOL: HeaderName = HeaderName::from_static("websocket-protocol");
}

/// HTTP header values
pub mod http_value {
    /// WebSocket upgrade value
    pub const WEBSOCKET: &str = "websocket";

    /// Legacy upgrade value
    pub const LEGACY_WEBSOCKET: &str = "WebSocket";

    /// Upgrade connection value
    pub const UPGRADE: &str = "Upgrade";

    /// Wildcard subprotocol
    pub const SUBPROTOCOL_WILDCARD: &str = "*";

    /// Content type of handshake error bodies
    pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=UTF-8";
}

/// Well-known stage names in a connection's chain
pub mod stage_names {
    /// HTTP request decoder (server) or response decoder (client)
    pub const HTTP_DECODER: &str = "http-decoder";

    /// HTTP response encoder (server) or request encoder (client)
    pub const HTTP_ENCODER: &str = "http-encoder";

    /// WebSocket frame decoder installed by the upgrade
    pub const WS_DECODER: &str = "ws-decoder";

    /// WebSocket frame encoder installed by the upgrade
    pub const WS_ENCODER: &str = "ws-encoder";

    /// Text payload validator
    pub const UTF8_VALIDATOR: &str = "ws-utf8-validator";

    /// Server handshake coordinator
    pub const SERVER_HANDSHAKER: &str = "ws-server-handshaker";

    /// Client handshake coordinator
    pub const CLIENT_HANDSHAKER: &str = "ws-client-handshaker";

    /// Close handshake coordinator
    pub const PROTOCOL: &str = "ws-protocol";
}
