//! Client handshake tests
//!
//! The server side is played by hand: requests are parsed and answered with
//! the core validator, so each test controls exactly what the client sees.

use bytes::{Bytes, BytesMut};
use http::Uri;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wspipe_client::prelude::*;
use wspipe_core::codec::http::{encode_response, parse_request};
use wspipe_core::error::TimeoutError;
use wspipe_core::protocol::stage_names::*;
use wspipe_core::validator::validate_request;

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

fn client(config: ClientProtocolConfig) -> (WebSocketClientProtocol, Pipeline) {
    let protocol = WebSocketClientProtocol::new(config.handshake_timeout(None))
        .unwrap()
        .with_key(KEY);
    let pipeline = protocol.new_pipeline().unwrap();
    (protocol, pipeline)
}

fn default_config() -> ClientProtocolConfig {
    ClientProtocolConfig::new(Uri::from_static("ws://localhost:8080/ws"))
}

fn sent_request(pipeline: &mut Pipeline) -> HandshakeRequest {
    let bytes = pipeline.read_outbound().unwrap().into_bytes().unwrap();
    let (consumed, request) = parse_request(&bytes, 8192).unwrap().unwrap();
    assert_eq!(consumed, bytes.len());
    request
}

fn answer(request: &HandshakeRequest, config: HandshakeConfig) -> Bytes {
    let accepted = validate_request(request, &config.websocket_path("/ws")).unwrap();
    encode_response(&accepted.response)
}

#[test]
fn test_request_sent_on_activation() {
    let (_, mut pipeline) = client(default_config());
    assert!(pipeline.read_outbound().is_none());

    assert_ok!(pipeline.fire_active());
    let request = sent_request(&mut pipeline);
    assert_eq!(request.uri, "/ws");
    assert_eq!(request.header_str("host"), Some("localhost:8080"));
    assert_eq!(request.header_str("sec-websocket-key"), Some(KEY));
    assert_eq!(request.header_str("sec-websocket-version"), Some("13"));
    assert_eq!(request.header_str("origin"), Some("http://localhost:8080"));
}

#[test]
fn test_valid_response_completes() {
    let (protocol, mut pipeline) = client(default_config());
    pipeline.fire_active().unwrap();
    let request = sent_request(&mut pipeline);

    assert_ok!(pipeline.fire_read(answer(&request, HandshakeConfig::default())));
    assert_eq!(
        pipeline.names(),
        vec![WS_ENCODER, WS_DECODER, UTF8_VALIDATOR, PROTOCOL]
    );
    assert!(matches!(
        pipeline.read_event(),
        Some(PipelineEvent::HandshakeComplete(_))
    ));

    let handshaker = protocol.handshaker(pipeline.connection_id()).unwrap();
    assert_eq!(handshaker.role(), Role::Client);
    assert_eq!(handshaker.uri(), "/ws");
    assert!(Arc::ptr_eq(handshaker.config(), protocol.handshake_config()));

    // client frames are masked
    pipeline.write(Frame::text("hi")).unwrap();
    let bytes = pipeline.read_outbound().unwrap().into_bytes().unwrap();
    let frame = Frame::parse(&mut BytesMut::from(bytes.as_ref()), 1024).unwrap();
    assert!(frame.masked);
    assert_eq!(frame.as_text(), Some("hi"));
}

#[test]
fn test_frame_in_same_segment_as_response() {
    let (_, mut pipeline) = client(default_config());
    pipeline.fire_active().unwrap();
    let request = sent_request(&mut pipeline);

    let mut wire = BytesMut::from(answer(&request, HandshakeConfig::default()).as_ref());
    Frame::text("hello").write_to(&mut wire);
    pipeline.fire_read(wire.freeze()).unwrap();

    assert!(pipeline.read_event().is_some());
    let frame = pipeline.read_inbound().and_then(Message::into_frame).unwrap();
    assert_eq!(frame.as_text(), Some("hello"));
}

#[test]
fn test_accept_mismatch_is_fatal() {
    let (protocol, mut pipeline) = client(default_config());
    pipeline.fire_active().unwrap();
    sent_request(&mut pipeline);

    let response = Bytes::from_static(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: AAAAAAAAAAAAAAAAAAAAAAAAAAA=\r\n\r\n",
    );
    let error = assert_err!(pipeline.fire_read(response));
    assert!(matches!(
        error,
        Error::Handshake(HandshakeError::InvalidAcceptKey { .. })
    ));
    assert!(matches!(
        pipeline.read_event(),
        Some(PipelineEvent::HandshakeFailed(HandshakeError::InvalidAcceptKey { .. }))
    ));
    assert!(!pipeline.contains(WS_DECODER));
    assert!(protocol.handshaker(pipeline.connection_id()).is_none());
    assert!(pipeline.is_closed());
}

#[test]
fn test_rejection_status_is_fatal() {
    let (_, mut pipeline) = client(default_config());
    pipeline.fire_active().unwrap();
    sent_request(&mut pipeline);

    let response = Bytes::from_static(
        b"HTTP/1.1 400 Bad Request\r\ncontent-length: 5\r\n\r\nnope!",
    );
    let error = assert_err!(pipeline.fire_read(response));
    assert!(matches!(
        error,
        Error::Handshake(HandshakeError::UnexpectedStatus(400))
    ));
}

#[test]
fn test_subprotocol_selected_by_server() {
    let config = default_config().add_subprotocol("chat.v1").add_subprotocol("chat.v2");
    let (protocol, mut pipeline) = client(config);
    pipeline.fire_active().unwrap();
    let request = sent_request(&mut pipeline);
    assert_eq!(
        request.header_str("sec-websocket-protocol"),
        Some("chat.v1, chat.v2")
    );

    let server = HandshakeConfig::default().add_subprotocol("chat.v2");
    pipeline.fire_read(answer(&request, server)).unwrap();
    let handshaker = protocol.handshaker(pipeline.connection_id()).unwrap();
    assert_eq!(handshaker.subprotocol(), Some("chat.v2"));
}

#[test]
fn test_transport_closed_mid_handshake() {
    let (_, mut pipeline) = client(default_config());
    pipeline.fire_active().unwrap();
    pipeline.fire_inactive().unwrap();
    assert!(matches!(
        pipeline.read_event(),
        Some(PipelineEvent::HandshakeFailed(HandshakeError::ConnectionClosed))
    ));
}

#[test]
fn test_install_on_active_pipeline_sends_request() {
    let protocol = WebSocketClientProtocol::new(default_config().handshake_timeout(None)).unwrap();
    let mut pipeline = Pipeline::new();
    pipeline.fire_active().unwrap();
    protocol.install(&mut pipeline).unwrap();
    let request = sent_request(&mut pipeline);
    assert!(request.header_str("sec-websocket-key").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let config = default_config().handshake_timeout(Some(Duration::from_secs(3)));
    let protocol = WebSocketClientProtocol::new(config).unwrap();
    let mut pipeline = protocol.new_pipeline().unwrap();
    pipeline.fire_active().unwrap();

    let fired = pipeline.next_timer().await;
    let error = assert_err!(pipeline.fire_timer(fired));
    assert!(matches!(error, Error::Timeout(TimeoutError::Handshake { .. })));
    assert!(matches!(pipeline.read_event(), Some(PipelineEvent::HandshakeTimeout)));
    assert!(pipeline.is_closed());
}
