//! Integration tests for the wspipe server
//!
//! These tests drive a server pipeline with raw bytes, the way a transport
//! would, and inspect what it writes back.

use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wspipe_core::accept::compute_accept_key;
use wspipe_core::codec::http::parse_response;
use wspipe_core::error::{Error, TimeoutError};
use wspipe_core::protocol::stage_names::*;
use wspipe_server::prelude::*;

const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Answers text frames and greets on upgrade
struct Processor {
    greet: bool,
}

impl Stage for Processor {
    fn event(&mut self, ctx: &mut StageContext<'_>, event: PipelineEvent) -> Result<()> {
        if self.greet {
            if let PipelineEvent::HandshakeComplete(_) = &event {
                ctx.write(Frame::text("welcome"));
            }
        }
        ctx.fire_event(event);
        Ok(())
    }

    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        match msg {
            Message::Frame(frame) if frame.opcode == Opcode::Text => {
                let text = frame.as_text().unwrap_or_default().to_string();
                ctx.write(Frame::text(format!("processed: {}", text)));
            }
            other => ctx.fire_read(other),
        }
        Ok(())
    }
}

fn server(config: ServerProtocolConfig) -> (WebSocketServerProtocol, Pipeline) {
    let protocol = WebSocketServerProtocol::new(config.handshake_timeout(None)).unwrap();
    let mut pipeline = protocol.new_pipeline().unwrap();
    pipeline.add_last("app", Processor { greet: false }).unwrap();
    pipeline.fire_active().unwrap();
    (protocol, pipeline)
}

fn upgrade_request(path: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: server.example.com\r\n\
         Upgrade: websocket\r\n\
         Connection: keep-alive, Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path, KEY
    )
}

fn response(pipeline: &mut Pipeline) -> HandshakeResponse {
    let bytes = pipeline.read_outbound().unwrap().into_bytes().unwrap();
    let (consumed, response) = parse_response(&bytes, 8192).unwrap().unwrap();
    assert_eq!(consumed, bytes.len());
    response
}

fn outbound_frame(pipeline: &mut Pipeline) -> Frame {
    let bytes = pipeline.read_outbound().unwrap().into_bytes().unwrap();
    let mut buf = BytesMut::from(bytes.as_ref());
    Frame::parse(&mut buf, usize::MAX).unwrap()
}

#[test]
fn test_valid_upgrade() {
    let (protocol, mut pipeline) = server(ServerProtocolConfig::default());
    assert_ok!(pipeline.fire_read(Bytes::from(upgrade_request("/"))));

    let response = response(&mut pipeline);
    assert_eq!(response.status.as_u16(), 101);
    assert_eq!(response.header_str("upgrade"), Some("websocket"));
    assert_eq!(response.header_str("connection"), Some("Upgrade"));
    assert_eq!(
        response.header_str("sec-websocket-accept"),
        Some(compute_accept_key(KEY).as_str())
    );
    assert_eq!(
        response.header_str("sec-websocket-accept"),
        Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
    );

    assert!(!pipeline.contains(SERVER_HANDSHAKER));
    assert_eq!(
        pipeline.names(),
        vec![WS_ENCODER, WS_DECODER, UTF8_VALIDATOR, PROTOCOL, "app"]
    );

    let handshaker = protocol.handshaker(pipeline.connection_id()).unwrap();
    assert_eq!(handshaker.version(), WebSocketVersion::V13);
    assert_eq!(handshaker.role(), Role::Server);
    assert_eq!(handshaker.uri(), "/");

    match pipeline.read_event() {
        Some(PipelineEvent::HandshakeComplete(complete)) => {
            assert_eq!(complete.request_uri, "/");
            assert_eq!(complete.subprotocol, None);
            assert!(complete.request_headers.contains_key("sec-websocket-key"));
            assert!(complete.response_headers.contains_key("sec-websocket-accept"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_codec_installed_before_completion_event() {
    let protocol =
        WebSocketServerProtocol::new(ServerProtocolConfig::default().handshake_timeout(None)).unwrap();
    let mut pipeline = protocol.new_pipeline().unwrap();
    pipeline.add_last("app", Processor { greet: true }).unwrap();
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();

    assert_eq!(response(&mut pipeline).status.as_u16(), 101);
    // written while handling the event, so it went through the frame encoder
    let greeting = outbound_frame(&mut pipeline);
    assert_eq!(greeting.as_text(), Some("welcome"));
    assert!(!greeting.masked);
}

#[test]
fn test_frames_after_upgrade_reach_application() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default());
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();
    response(&mut pipeline);

    let frame = Frame::text("payload").mask(true).to_bytes();
    assert_ok!(pipeline.fire_read(frame));
    assert_eq!(outbound_frame(&mut pipeline).as_text(), Some("processed: payload"));
}

#[test]
fn test_frame_in_same_segment_as_request() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default());
    let mut wire = BytesMut::from(upgrade_request("/").as_bytes());
    Frame::text("payload").mask(true).write_to(&mut wire);
    assert_ok!(pipeline.fire_read(wire.freeze()));

    assert_eq!(response(&mut pipeline).status.as_u16(), 101);
    assert_eq!(outbound_frame(&mut pipeline).as_text(), Some("processed: payload"));
}

#[test]
fn test_bogus_upgrade_header() {
    let (protocol, mut pipeline) = server(ServerProtocolConfig::default());
    let request = upgrade_request("/").replace("Upgrade: websocket", "Upgrade: BogusSocket");
    assert_ok!(pipeline.fire_read(Bytes::from(request)));

    let response = response(&mut pipeline);
    assert_eq!(response.status.as_u16(), 400);
    assert_eq!(
        response.body_text(),
        "not a WebSocket handshake request: missing upgrade"
    );
    assert!(pipeline.contains(SERVER_HANDSHAKER));
    assert!(pipeline.contains(HTTP_DECODER));
    assert!(!pipeline.contains(WS_DECODER));
    assert!(protocol.handshaker(pipeline.connection_id()).is_none());
    assert!(matches!(
        pipeline.read_event(),
        Some(PipelineEvent::HandshakeFailed(HandshakeError::MissingUpgrade))
    ));
    assert!(!pipeline.is_closed());
}

#[test]
fn test_missing_key() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default());
    let request = upgrade_request("/").replace(&format!("Sec-WebSocket-Key: {}\r\n", KEY), "");
    pipeline.fire_read(Bytes::from(request)).unwrap();

    let response = response(&mut pipeline);
    assert_eq!(response.status.as_u16(), 400);
    assert_eq!(response.body_text(), "not a WebSocket request: missing key");
    assert!(!pipeline.contains(WS_DECODER));
}

#[test]
fn test_unsupported_version() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default());
    let request = upgrade_request("/").replace("Sec-WebSocket-Version: 13", "Sec-WebSocket-Version: 9");
    pipeline.fire_read(Bytes::from(request)).unwrap();

    let response = response(&mut pipeline);
    assert_eq!(response.status.as_u16(), 426);
    assert_eq!(response.header_str("sec-websocket-version"), Some("13"));
}

#[test]
fn test_utf8_validator_follows_config() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default().validate_utf8(false));
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();
    assert_eq!(pipeline.names(), vec![WS_ENCODER, WS_DECODER, PROTOCOL, "app"]);
}

#[test]
fn test_invalid_utf8_closes_with_1007() {
    let (_, mut pipeline) = server(ServerProtocolConfig::default());
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();
    response(&mut pipeline);

    let frame = Frame::text(vec![0xC3, 0x28]).mask(true).to_bytes();
    assert!(matches!(pipeline.fire_read(frame), Err(Error::InvalidUtf8)));
    let close = outbound_frame(&mut pipeline);
    assert_eq!(
        CloseStatus::decode(&close.payload).unwrap(),
        Some(CloseStatus::INVALID_PAYLOAD_DATA)
    );
    assert!(pipeline.is_closed());
}

#[test]
fn test_subprotocol_negotiation() {
    let config = ServerProtocolConfig::default()
        .add_subprotocol("chat.v2")
        .add_subprotocol("chat.v1");
    let (protocol, mut pipeline) = server(config);
    let request = upgrade_request("/").replace(
        "\r\n\r\n",
        "\r\nSec-WebSocket-Protocol: chat.v1, chat.v2\r\n\r\n",
    );
    pipeline.fire_read(Bytes::from(request)).unwrap();

    let response = response(&mut pipeline);
    assert_eq!(response.header_str("sec-websocket-protocol"), Some("chat.v2"));
    let handshaker = protocol.handshaker(pipeline.connection_id()).unwrap();
    assert_eq!(handshaker.subprotocol(), Some("chat.v2"));
}

#[test]
fn test_exact_path_matching() {
    for (path, upgraded) in [("/test", true), ("/test?q=v", true), ("/testabc", false), ("/", false)] {
        let (_, mut pipeline) = server(ServerProtocolConfig::new("/test"));
        pipeline.fire_read(Bytes::from(upgrade_request(path))).unwrap();
        let status = response(&mut pipeline).status.as_u16();
        assert_eq!(status == 101, upgraded, "path {}", path);
    }
}

#[test]
fn test_prefix_path_matching() {
    let cases = [
        ("/test", "/test", true),
        ("/test", "/test?q=v", true),
        ("/test", "/testabc", true),
        ("/test", "/", false),
        ("/", "/", true),
        ("/", "/test", true),
        ("/", "/?q=v", true),
    ];
    for (endpoint, path, upgraded) in cases {
        let config = ServerProtocolConfig::new(endpoint).path_match(PathMatch::Prefix);
        let (_, mut pipeline) = server(config);
        pipeline.fire_read(Bytes::from(upgrade_request(path))).unwrap();
        let status = response(&mut pipeline).status.as_u16();
        assert_eq!(status == 101, upgraded, "endpoint {} path {}", endpoint, path);
    }
}

#[test]
fn test_unmatched_requests_forwarded() {
    let config = ServerProtocolConfig::new("/ws").forward_unmatched_requests(true);
    let (_, mut pipeline) = server(config);
    pipeline
        .fire_read(Bytes::from_static(b"GET /health HTTP/1.1\r\nHost: a\r\n\r\n"))
        .unwrap();
    assert!(pipeline.read_outbound().is_none());
    let request = pipeline.read_inbound().and_then(Message::into_request).unwrap();
    assert_eq!(request.uri, "/health");
    assert!(pipeline.contains(SERVER_HANDSHAKER));
}

#[test]
fn test_legacy_handshake() {
    let (protocol, mut pipeline) = server(ServerProtocolConfig::new("/demo"));
    let mut wire = BytesMut::from(
        &b"GET /demo HTTP/1.1\r\n\
           Host: example.com\r\n\
           Connection: Upgrade\r\n\
           Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
           Upgrade: WebSocket\r\n\
           Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
           Origin: http://example.com\r\n\
           \r\n\
           ^n:ds[4U"[..],
    );
    wire.extend_from_slice(b"\x00hello\xff");
    pipeline.fire_read(wire.freeze()).unwrap();

    let response = response(&mut pipeline);
    assert_eq!(response.status.as_u16(), 101);
    assert_eq!(response.status_message, "WebSocket Protocol Handshake");
    assert_eq!(response.body.as_ref(), b"8jKS'y:G*Co,Wxa-");
    assert_eq!(
        response.header_str("sec-websocket-location"),
        Some("ws://example.com/demo")
    );
    assert_eq!(
        protocol.handshaker(pipeline.connection_id()).map(|h| h.version()),
        Some(WebSocketVersion::V00)
    );

    let reply = pipeline.read_outbound().unwrap().into_bytes().unwrap();
    assert_eq!(reply.as_ref(), b"\x00processed: hello\xff");
}

#[test]
fn test_registry_cleared_when_connection_closes() {
    let (protocol, mut pipeline) = server(ServerProtocolConfig::default());
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();
    assert_eq!(protocol.registry().len(), 1);

    pipeline.fire_inactive().unwrap();
    assert!(protocol.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let config = ServerProtocolConfig::default().handshake_timeout(Some(Duration::from_secs(5)));
    let protocol = WebSocketServerProtocol::new(config).unwrap();
    let mut pipeline = protocol.new_pipeline().unwrap();
    pipeline.fire_active().unwrap();
    assert!(pipeline.has_pending_timers());

    let fired = pipeline.next_timer().await;
    let result = pipeline.fire_timer(fired);
    assert!(matches!(
        assert_err!(result),
        Error::Timeout(TimeoutError::Handshake { .. })
    ));
    assert!(matches!(pipeline.read_event(), Some(PipelineEvent::HandshakeTimeout)));
    assert!(pipeline.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_completion_cancels_timeout() {
    let config = ServerProtocolConfig::default().handshake_timeout(Some(Duration::from_secs(5)));
    let protocol = WebSocketServerProtocol::new(config).unwrap();
    let mut pipeline = protocol.new_pipeline().unwrap();
    pipeline.fire_active().unwrap();
    pipeline.fire_read(Bytes::from(upgrade_request("/"))).unwrap();
    assert!(!pipeline.has_pending_timers());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_ok!(pipeline.run_pending_timers());
    assert!(!pipeline.is_closed());
}
