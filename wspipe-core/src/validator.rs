//! Server-side upgrade request validation
//!
//! [`validate_request`] is a pure function: it either builds the response that
//! accepts the upgrade or returns the first [`HandshakeError`] found, checking
//! in this order: method, path, `Upgrade`, `Connection`, version, key,
//! subprotocol.

use crate::accept::{compute_accept_key, legacy_challenge_response};
use crate::config::HandshakeConfig;
use crate::error::HandshakeError;
use crate::handshake::{
    header_contains_token, header_tokens, header_value, HandshakeRequest, HandshakeResponse,
};
use crate::path::{path_matches, request_path};
use crate::protocol::{http_header, http_status, http_value, WebSocketVersion};
use http::header::{self, HeaderName, HeaderValue};
use http::{Method, StatusCode};

/// Outcome of a successful validation
#[derive(Debug, Clone)]
pub struct AcceptedHandshake {
    /// Negotiated protocol revision
    pub version: WebSocketVersion,
    /// Selected subprotocol, if any
    pub subprotocol: Option<String>,
    /// The 101 response to send
    pub response: HandshakeResponse,
}

impl AcceptedHandshake {
    /// The `Sec-WebSocket-Accept` value, absent for legacy handshakes
    pub fn accept_token(&self) -> Option<&str> {
        self.response.header_str(header::SEC_WEBSOCKET_ACCEPT)
    }
}

/// Validate an upgrade request against the endpoint configuration
pub fn validate_request(
    request: &HandshakeRequest,
    config: &HandshakeConfig,
) -> Result<AcceptedHandshake, HandshakeError> {
    if request.method != Method::GET {
        return Err(HandshakeError::InvalidMethod(request.method.to_string()));
    }

    if !path_matches(&request.uri, &config.websocket_path, config.path_match) {
        return Err(HandshakeError::PathMismatch {
            path: request_path(&request.uri).to_string(),
            expected: config.websocket_path.clone(),
        });
    }

    let upgrade = request.header_str(header::UPGRADE);
    if !upgrade.is_some_and(|value| value.trim().eq_ignore_ascii_case(http_value::WEBSOCKET)) {
        return Err(HandshakeError::MissingUpgrade);
    }

    if !header_contains_token(&request.headers, header::CONNECTION, http_value::UPGRADE) {
        return Err(HandshakeError::MissingConnection);
    }

    let version_header = request.header_str(header::SEC_WEBSOCKET_VERSION);
    let version = WebSocketVersion::from_header(version_header).ok_or_else(|| {
        HandshakeError::UnsupportedVersion(version_header.unwrap_or_default().to_string())
    })?;

    let key = match version {
        WebSocketVersion::V00 => None,
        _ => Some(
            request
                .header_str(header::SEC_WEBSOCKET_KEY)
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or(HandshakeError::MissingKey)?,
        ),
    };

    let subprotocol = select_subprotocol(request, config)?;

    let response = match key {
        None => legacy_response(request, subprotocol.as_deref())?,
        Some(key) => {
            let mut response = HandshakeResponse::switching_protocols().header(
                header::SEC_WEBSOCKET_ACCEPT,
                response_value(&header::SEC_WEBSOCKET_ACCEPT, &compute_accept_key(key))?,
            );
            if let Some(protocol) = &subprotocol {
                response = response.header(
                    header::SEC_WEBSOCKET_PROTOCOL,
                    response_value(&header::SEC_WEBSOCKET_PROTOCOL, protocol)?,
                );
            }
            response
        }
    };

    Ok(AcceptedHandshake {
        version,
        subprotocol,
        response,
    })
}

/// Pick the first configured subprotocol the client offered.
///
/// A configured `*` accepts the client's first offer.
fn select_subprotocol(
    request: &HandshakeRequest,
    config: &HandshakeConfig,
) -> Result<Option<String>, HandshakeError> {
    if config.subprotocols.is_empty() {
        return Ok(None);
    }

    let offered_header = if request.headers.contains_key(header::SEC_WEBSOCKET_PROTOCOL) {
        header::SEC_WEBSOCKET_PROTOCOL
    } else {
        http_header::WEBSOCKET_PROTOCOL
    };
    let offered = header_tokens(&request.headers, offered_header);

    let selected = config.subprotocols.iter().find_map(|supported| {
        if supported == http_value::SUBPROTOCOL_WILDCARD {
            offered.first().cloned()
        } else {
            offered.iter().find(|p| *p == supported).cloned()
        }
    });

    if selected.is_none() && config.require_subprotocol {
        return Err(HandshakeError::SubprotocolMismatch {
            offered: offered.join(", "),
        });
    }
    Ok(selected)
}

/// hixie-76 response when both challenge keys are present, hixie-75 otherwise
fn legacy_response(
    request: &HandshakeRequest,
    subprotocol: Option<&str>,
) -> Result<HandshakeResponse, HandshakeError> {
    let location = format!(
        "ws://{}{}",
        request.header_str(header::HOST).unwrap_or_default(),
        request.uri
    );
    let origin = request.header_str(header::ORIGIN);

    let mut response = HandshakeResponse::new(StatusCode::SWITCHING_PROTOCOLS)
        .status_message(http_status::LEGACY_SWITCHING_REASON)
        .header(
            header::UPGRADE,
            HeaderValue::from_static(http_value::LEGACY_WEBSOCKET),
        )
        .header(header::CONNECTION, HeaderValue::from_static(http_value::UPGRADE));

    let key1 = request.header_str(http_header::SEC_WEBSOCKET_KEY1);
    let key2 = request.header_str(http_header::SEC_WEBSOCKET_KEY2);
    let (origin_header, location_header, protocol_header): (HeaderName, HeaderName, HeaderName) =
        match (key1, key2) {
            (Some(key1), Some(key2)) => {
                let challenge = legacy_challenge_response(key1, key2, &request.body)?;
                response = response.body(challenge.to_vec());
                (
                    http_header::SEC_WEBSOCKET_ORIGIN,
                    http_header::SEC_WEBSOCKET_LOCATION,
                    header::SEC_WEBSOCKET_PROTOCOL,
                )
            }
            _ => (
                http_header::WEBSOCKET_ORIGIN,
                http_header::WEBSOCKET_LOCATION,
                http_header::WEBSOCKET_PROTOCOL,
            ),
        };

    if let Some(origin) = origin {
        let value = response_value(&origin_header, origin)?;
        response = response.header(origin_header, value);
    }
    let value = response_value(&location_header, &location)?;
    response = response.header(location_header, value);
    if let Some(protocol) = subprotocol {
        let value = response_value(&protocol_header, protocol)?;
        response = response.header(protocol_header, value);
    }
    Ok(response)
}

fn response_value(name: &HeaderName, value: &str) -> Result<HeaderValue, HandshakeError> {
    header_value(name, value).map_err(|_| HandshakeError::InvalidKey(value.to_string()))
}
