//! HTTP/1.1 codec stages used before the upgrade
//!
//! The decoders aggregate one complete message (head plus body) per call and
//! resume themselves while input remains, so a stage further down can swap
//! the codec out between two messages. Bytes still buffered when a decoder is
//! removed are forwarded as raw bytes to whatever replaced it.

use crate::error::{Error, ProtocolError, Result};
use crate::handshake::{HandshakeRequest, HandshakeResponse};
use crate::message::Message;
use crate::promise::WritePromise;
use crate::protocol::constants::{LEGACY_CHALLENGE_LEN, MAX_HEADERS};
use crate::protocol::http_header;
use crate::stage::{Stage, StageContext};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Version};
use httparse::Status;

/// Serialize a request head and body
pub fn encode_request(request: &HandshakeRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + request.body.len());
    buf.put_slice(request.method.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(request.uri.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(version_str(request.version).as_bytes());
    buf.put_slice(b"\r\n");
    write_headers(&mut buf, &request.headers, !request.body.is_empty(), request.body.len());
    buf.put_slice(&request.body);
    buf.freeze()
}

/// Serialize a response head and body.
///
/// `content-length` is added unless the response is a bodiless `101`.
pub fn encode_response(response: &HandshakeResponse) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + response.body.len());
    buf.put_slice(version_str(response.version).as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(response.status.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(response.status_message.as_bytes());
    buf.put_slice(b"\r\n");
    let with_length =
        response.status != StatusCode::SWITCHING_PROTOCOLS || !response.body.is_empty();
    write_headers(&mut buf, &response.headers, with_length, response.body.len());
    buf.put_slice(&response.body);
    buf.freeze()
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn write_headers(buf: &mut BytesMut, headers: &HeaderMap, with_length: bool, body_len: usize) {
    for (name, value) in headers {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    if with_length && !headers.contains_key(header::CONTENT_LENGTH) {
        buf.put_slice(format!("content-length: {}\r\n", body_len).as_bytes());
    }
    buf.put_slice(b"\r\n");
}

fn invalid(message: impl Into<String>) -> Error {
    ProtocolError::InvalidFormat(message.into()).into()
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for item in raw {
        let name = HeaderName::from_bytes(item.name.as_bytes())
            .map_err(|_| invalid(format!("invalid header name {:?}", item.name)))?;
        let value = HeaderValue::from_bytes(item.value).map_err(|_| {
            ProtocolError::InvalidHeaderValue {
                header: item.name.to_string(),
                value: String::from_utf8_lossy(item.value).into_owned(),
            }
        })?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>> {
    match headers.get(header::CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .map(Some)
            .ok_or_else(|| invalid("invalid content-length")),
    }
}

fn head_len(status: Status<usize>, buffered: usize, max_header_size: usize) -> Result<Option<usize>> {
    match status {
        Status::Complete(len) if len > max_header_size => Err(ProtocolError::HeadersTooLarge {
            max: max_header_size,
        }
        .into()),
        Status::Complete(len) => Ok(Some(len)),
        Status::Partial if buffered > max_header_size => Err(ProtocolError::HeadersTooLarge {
            max: max_header_size,
        }
        .into()),
        Status::Partial => Ok(None),
    }
}

/// Body bytes beyond the head, if all of them are buffered
fn body(buf: &[u8], head_len: usize, body_len: usize, max_body: usize) -> Result<Option<Bytes>> {
    if body_len > max_body {
        return Err(invalid(format!("body of {} bytes not accepted", body_len)));
    }
    if buf.len() < head_len + body_len {
        return Ok(None);
    }
    Ok(Some(Bytes::copy_from_slice(&buf[head_len..head_len + body_len])))
}

/// Parse one request from the front of `buf`.
///
/// Returns the request and the number of bytes it spans, or `None` while
/// incomplete. A legacy request carrying both challenge keys and no
/// `content-length` owns the 8 bytes that follow its head.
pub fn parse_request(buf: &[u8], max_header_size: usize) -> Result<Option<(usize, HandshakeRequest)>> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut raw);
    let status = parsed
        .parse(buf)
        .map_err(|e| invalid(format!("malformed request: {}", e)))?;
    let Some(head_len) = head_len(status, buf.len(), max_header_size)? else {
        return Ok(None);
    };

    let method = Method::from_bytes(parsed.method.unwrap_or_default().as_bytes())
        .map_err(|_| invalid("invalid method"))?;
    let uri = parsed.path.unwrap_or("/").to_string();
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let headers = collect_headers(parsed.headers)?;

    let body_len = match content_length(&headers)? {
        Some(len) => len,
        None if headers.contains_key(http_header::SEC_WEBSOCKET_KEY1)
            && headers.contains_key(http_header::SEC_WEBSOCKET_KEY2) =>
        {
            LEGACY_CHALLENGE_LEN
        }
        None => 0,
    };
    let Some(body) = body(buf, head_len, body_len, max_header_size)? else {
        return Ok(None);
    };

    let request = HandshakeRequest {
        method,
        uri,
        version,
        headers,
        body,
    };
    Ok(Some((head_len + body_len, request)))
}

/// Parse one response from the front of `buf`
pub fn parse_response(buf: &[u8], max_header_size: usize) -> Result<Option<(usize, HandshakeResponse)>> {
    let mut raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut raw);
    let status = parsed
        .parse(buf)
        .map_err(|e| invalid(format!("malformed response: {}", e)))?;
    let Some(head_len) = head_len(status, buf.len(), max_header_size)? else {
        return Ok(None);
    };

    let code = StatusCode::from_u16(parsed.code.unwrap_or_default())
        .map_err(|_| invalid("invalid status code"))?;
    let status_message = parsed.reason.unwrap_or_default().to_string();
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let headers = collect_headers(parsed.headers)?;

    let body_len = content_length(&headers)?.unwrap_or(0);
    let Some(body) = body(buf, head_len, body_len, max_header_size)? else {
        return Ok(None);
    };

    let response = HandshakeResponse {
        status: code,
        status_message,
        version,
        headers,
        body,
    };
    Ok(Some((head_len + body_len, response)))
}

type Parser<T> = fn(&[u8], usize) -> Result<Option<(usize, T)>>;

/// Shared buffering for the two decoders
#[derive(Debug)]
struct Decoder {
    buf: BytesMut,
    max_header_size: usize,
    failed: bool,
}

impl Decoder {
    fn new(max_header_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_header_size,
            failed: false,
        }
    }

    fn read<T: Into<Message>>(&mut self, ctx: &mut StageContext<'_>, msg: Message, parse: Parser<T>) -> Result<()> {
        match msg {
            Message::Bytes(bytes) => {
                if self.failed {
                    return Ok(());
                }
                self.buf.extend_from_slice(&bytes);
                self.decode(ctx, parse)
            }
            other => {
                ctx.fire_read(other);
                Ok(())
            }
        }
    }

    fn decode<T: Into<Message>>(&mut self, ctx: &mut StageContext<'_>, parse: Parser<T>) -> Result<()> {
        if self.failed || self.buf.is_empty() {
            return Ok(());
        }
        match parse(&self.buf, self.max_header_size) {
            Ok(Some((consumed, message))) => {
                self.buf.advance(consumed);
                ctx.fire_read(message);
                if !self.buf.is_empty() {
                    ctx.resume();
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => {
                crate::log_debug!("{} http decoding failed: {}", ctx.connection_id(), error);
                self.failed = true;
                self.buf.clear();
                ctx.close();
                Err(error)
            }
        }
    }

    fn removed(&mut self, ctx: &mut StageContext<'_>) {
        if !self.buf.is_empty() && !self.failed {
            ctx.fire_read(self.buf.split().freeze());
        }
    }
}

/// Turns inbound bytes into [`HandshakeRequest`]s
#[derive(Debug)]
pub struct HttpRequestDecoder {
    inner: Decoder,
}

impl HttpRequestDecoder {
    /// Decoder rejecting header blocks larger than `max_header_size`
    pub fn new(max_header_size: usize) -> Self {
        Self {
            inner: Decoder::new(max_header_size),
        }
    }
}

impl Stage for HttpRequestDecoder {
    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        self.inner.read::<HandshakeRequest>(ctx, msg, parse_request)
    }

    fn resume(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.inner.decode::<HandshakeRequest>(ctx, parse_request)
    }

    fn handler_removed(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.inner.removed(ctx);
        Ok(())
    }
}

/// Turns inbound bytes into [`HandshakeResponse`]s
#[derive(Debug)]
pub struct HttpResponseDecoder {
    inner: Decoder,
}

impl HttpResponseDecoder {
    /// Decoder rejecting header blocks larger than `max_header_size`
    pub fn new(max_header_size: usize) -> Self {
        Self {
            inner: Decoder::new(max_header_size),
        }
    }
}

impl Stage for HttpResponseDecoder {
    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        self.inner.read::<HandshakeResponse>(ctx, msg, parse_response)
    }

    fn resume(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.inner.decode::<HandshakeResponse>(ctx, parse_response)
    }

    fn handler_removed(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.inner.removed(ctx);
        Ok(())
    }
}

/// Serializes outbound [`HandshakeResponse`]s
#[derive(Debug, Default)]
pub struct HttpResponseEncoder;

impl Stage for HttpResponseEncoder {
    fn write(&mut self, ctx: &mut StageContext<'_>, msg: Message, promise: Option<WritePromise>) -> Result<()> {
        match msg {
            Message::Response(response) => ctx.write_with_promise(encode_response(&response), promise),
            other => ctx.write_with_promise(other, promise),
        }
        Ok(())
    }
}

/// Serializes outbound [`HandshakeRequest`]s
#[derive(Debug, Default)]
pub struct HttpRequestEncoder;

impl Stage for HttpRequestEncoder {
    fn write(&mut self, ctx: &mut StageContext<'_>, msg: Message, promise: Option<WritePromise>) -> Result<()> {
        match msg {
            Message::Request(request) => ctx.write_with_promise(encode_request(&request), promise),
            other => ctx.write_with_promise(other, promise),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;

    const REQUEST: &[u8] = b"GET /chat?x=1 HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_parse_request() {
        let (consumed, request) = parse_request(REQUEST, 8192).unwrap().unwrap();
        assert_eq!(consumed, REQUEST.len());
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.uri, "/chat?x=1");
        assert_eq!(request.header_str("sec-websocket-version"), Some("13"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_parse_partial_request() {
        assert!(parse_request(&REQUEST[..20], 8192).unwrap().is_none());
    }

    #[test]
    fn test_parse_legacy_challenge_body() {
        let mut raw = b"GET /demo HTTP/1.1\r\n\
            Upgrade: WebSocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
            Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\r\n"
            .to_vec();
        assert!(parse_request(&raw, 8192).unwrap().is_none());

        raw.extend_from_slice(b"^n:ds[4Urest");
        let (consumed, request) = parse_request(&raw, 8192).unwrap().unwrap();
        assert_eq!(request.body.as_ref(), b"^n:ds[4U");
        assert_eq!(&raw[consumed..], b"rest");
    }

    #[test]
    fn test_header_block_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(200));
        let result = parse_request(&raw, 64);
        assert!(matches!(
            result,
            Err(Error::Protocol(ProtocolError::HeadersTooLarge { max: 64 }))
        ));
    }

    #[test]
    fn test_parse_response() {
        let raw = b"HTTP/1.1 400 Bad Request\r\ncontent-length: 5\r\n\r\nnope!";
        let (consumed, response) = parse_response(raw, 8192).unwrap().unwrap();
        assert_eq!(consumed, raw.len());
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.status_message, "Bad Request");
        assert_eq!(response.body_text(), "nope!");
    }

    #[test]
    fn test_encode_switching_protocols_has_no_length() {
        let encoded = encode_response(&HandshakeResponse::switching_protocols());
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("upgrade: websocket\r\n"));
        assert!(!text.contains("content-length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_encode_rejection_has_length() {
        let response = HandshakeResponse::new(StatusCode::BAD_REQUEST).body("bad");
        let encoded = encode_response(&response);
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(text.contains("content-length: 3\r\n"));
        assert!(text.ends_with("\r\n\r\nbad"));
    }

    #[test]
    fn test_encode_request() {
        let request = HandshakeRequest::new(Method::GET, "/chat")
            .header(header::HOST, HeaderValue::from_static("example.com"));
        let encoded = encode_request(&request);
        assert_eq!(
            encoded.as_ref(),
            b"GET /chat HTTP/1.1\r\nhost: example.com\r\n\r\n"
        );
    }

    #[test]
    fn test_decoder_stage_aggregates_split_input() {
        let mut pipeline = Pipeline::new();
        pipeline.add_last("http-decoder", HttpRequestDecoder::new(8192)).unwrap();
        pipeline.fire_read(Bytes::from_static(&REQUEST[..10])).unwrap();
        assert!(pipeline.read_inbound().is_none());

        let mut rest = REQUEST[10..].to_vec();
        rest.extend_from_slice(REQUEST);
        pipeline.fire_read(Bytes::from(rest)).unwrap();
        assert!(matches!(pipeline.read_inbound(), Some(Message::Request(_))));
        assert!(matches!(pipeline.read_inbound(), Some(Message::Request(_))));
        assert!(pipeline.read_inbound().is_none());
    }

    #[test]
    fn test_decoder_stage_closes_on_garbage() {
        let mut pipeline = Pipeline::new();
        pipeline.add_last("http-decoder", HttpRequestDecoder::new(8192)).unwrap();
        pipeline.fire_active().unwrap();
        let result = pipeline.fire_read(Bytes::from_static(b"\x00\x01\x02 nonsense\r\n\r\n"));
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(pipeline.is_closed());
        assert!(pipeline.read_inbound().is_none());
    }
}
