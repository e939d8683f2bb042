//! WebSocket handshake messages
//!
//! [`HandshakeRequest`] and [`HandshakeResponse`] are the aggregated HTTP
//! messages the HTTP codecs produce and consume. Header lookups are
//! case-insensitive through [`http::HeaderMap`].

use crate::error::{HandshakeError, ProtocolError};
use crate::protocol::{constants::WEBSOCKET_VERSION, http_value};
use bytes::Bytes;
use http::header::{self, AsHeaderName, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};

/// Aggregated HTTP upgrade request
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    /// HTTP method (should be GET)
    pub method: Method,
    /// Request target as sent on the request line
    pub uri: String,
    /// HTTP version
    pub version: Version,
    /// HTTP headers
    pub headers: HeaderMap,
    /// Request body, only non-empty for the legacy challenge
    pub body: Bytes,
}

impl HandshakeRequest {
    /// Create an HTTP/1.1 request with no headers
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header as text, `None` if absent or not visible ASCII
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        header_str(&self.headers, name)
    }
}

/// Aggregated HTTP response
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Reason phrase written on the status line
    pub status_message: String,
    /// HTTP version
    pub version: Version,
    /// HTTP headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl HandshakeResponse {
    /// Create a response with the canonical reason phrase
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// `101 Switching Protocols` carrying the upgrade headers
    pub fn switching_protocols() -> Self {
        Self::new(StatusCode::SWITCHING_PROTOCOLS)
            .header(header::UPGRADE, HeaderValue::from_static(http_value::WEBSOCKET))
            .header(header::CONNECTION, HeaderValue::from_static(http_value::UPGRADE))
    }

    /// Response for a rejected upgrade; the body is exactly the error message
    pub fn rejection(error: &HandshakeError) -> Self {
        let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
        let mut response = Self::new(status)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static(http_value::TEXT_PLAIN_UTF8),
            )
            .body(error.to_string());
        if let HandshakeError::UnsupportedVersion(_) = error {
            response.headers.insert(
                header::SEC_WEBSOCKET_VERSION,
                HeaderValue::from_static(WEBSOCKET_VERSION),
            );
        }
        response
    }

    /// Replace the reason phrase
    pub fn status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    /// Append a header
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header as text
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        header_str(&self.headers, name)
    }

    /// Body as UTF-8 text, lossy
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// First value of a header as text
pub fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether any comma-separated value of `name` equals `token`, ignoring case
pub fn header_contains_token<K: AsHeaderName>(headers: &HeaderMap, name: K, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// All comma-separated values of `name`, trimmed, empty items dropped
pub fn header_tokens<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Vec<String> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a header value from text
pub fn header_value(name: &HeaderName, value: &str) -> Result<HeaderValue, ProtocolError> {
    HeaderValue::from_str(value).map_err(|_| ProtocolError::InvalidHeaderValue {
        header: name.to_string(),
        value: value.to_string(),
    })
}
