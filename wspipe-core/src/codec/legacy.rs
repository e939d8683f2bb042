//! hixie-76 framing for the legacy (version 00) protocol
//!
//! Text messages are delimited: `0x00`, UTF-8 bytes, `0xFF`. Binary messages
//! carry a type byte with the high bit set followed by a base-128 length. The
//! closing handshake is the two bytes `0xFF 0x00`. There are no control frames
//! besides close and no masking.

use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::message::Message;
use crate::promise::WritePromise;
use crate::protocol::Opcode;
use crate::stage::{Stage, StageContext};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const TEXT_START: u8 = 0x00;
const TEXT_END: u8 = 0xFF;
const BINARY_TYPE: u8 = 0x80;
const CLOSE_TYPE: u8 = 0xFF;

/// Parse one legacy frame from the front of `buf`, `None` while incomplete
pub fn parse_legacy_frame(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(&frame_type) = buf.first() else {
        return Ok(None);
    };

    if frame_type & BINARY_TYPE == BINARY_TYPE {
        let mut len: usize = 0;
        let mut header_len = 1;
        loop {
            let Some(&byte) = buf.get(header_len) else {
                return Ok(None);
            };
            header_len += 1;
            len = len
                .checked_mul(128)
                .map_or(usize::MAX, |shifted| shifted | (byte & 0x7F) as usize);
            if len > max_payload {
                return Err(FrameError::TooLarge {
                    size: len,
                    max: max_payload,
                }
                .into());
            }
            if byte & 0x80 == 0 {
                break;
            }
        }

        if frame_type == CLOSE_TYPE && len == 0 {
            buf.advance(header_len);
            return Ok(Some(Frame::close(None)));
        }
        if buf.len() < header_len + len {
            return Ok(None);
        }
        buf.advance(header_len);
        let payload = buf.split_to(len).freeze();
        return Ok(Some(Frame::binary(payload)));
    }

    match buf[1..].iter().position(|byte| *byte == TEXT_END) {
        Some(end) => {
            if end > max_payload {
                return Err(FrameError::TooLarge {
                    size: end,
                    max: max_payload,
                }
                .into());
            }
            buf.advance(1);
            let payload = buf.split_to(end).freeze();
            buf.advance(1);
            Ok(Some(Frame::text(payload)))
        }
        None if buf.len() - 1 > max_payload => Err(FrameError::TooLarge {
            size: buf.len() - 1,
            max: max_payload,
        }
        .into()),
        None => Ok(None),
    }
}

/// Serialize a frame in legacy framing
pub fn encode_legacy_frame(frame: &Frame) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(frame.payload.len() + 10);
    match frame.opcode {
        Opcode::Text | Opcode::Continuation => {
            buf.put_u8(TEXT_START);
            buf.put_slice(&frame.payload);
            buf.put_u8(TEXT_END);
        }
        Opcode::Binary => {
            buf.put_u8(BINARY_TYPE);
            let len = frame.payload.len();
            let mut groups = Vec::new();
            let mut rest = len;
            loop {
                groups.push((rest & 0x7F) as u8);
                rest >>= 7;
                if rest == 0 {
                    break;
                }
            }
            for (i, group) in groups.iter().rev().enumerate() {
                let more = if i + 1 < groups.len() { 0x80 } else { 0 };
                buf.put_u8(group | more);
            }
            buf.put_slice(&frame.payload);
        }
        Opcode::Close => {
            buf.put_u8(CLOSE_TYPE);
            buf.put_u8(0x00);
        }
        Opcode::Ping | Opcode::Pong => {
            return Err(FrameError::InvalidOpcode(frame.opcode.value()).into());
        }
    }
    Ok(buf.freeze())
}

/// Turns inbound bytes into legacy [`Frame`]s
#[derive(Debug)]
pub struct LegacyFrameDecoder {
    buf: BytesMut,
    max_payload: usize,
    failed: bool,
}

impl LegacyFrameDecoder {
    /// Decoder accepting payloads up to `max_payload` bytes
    pub fn new(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_payload,
            failed: false,
        }
    }

    fn decode(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.failed || self.buf.is_empty() {
            return Ok(());
        }
        match parse_legacy_frame(&mut self.buf, self.max_payload) {
            Ok(Some(frame)) => {
                ctx.fire_read(frame);
                if !self.buf.is_empty() {
                    ctx.resume();
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => {
                crate::log_debug!("{} legacy frame decoding failed: {}", ctx.connection_id(), error);
                self.failed = true;
                self.buf.clear();
                ctx.close();
                Err(error)
            }
        }
    }
}

impl Stage for LegacyFrameDecoder {
    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        match msg {
            Message::Bytes(bytes) => {
                if self.failed {
                    return Ok(());
                }
                self.buf.extend_from_slice(&bytes);
                self.decode(ctx)
            }
            other => {
                ctx.fire_read(other);
                Ok(())
            }
        }
    }

    fn resume(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.decode(ctx)
    }
}

/// Serializes outbound [`Frame`]s in legacy framing
#[derive(Debug, Default)]
pub struct LegacyFrameEncoder;

impl Stage for LegacyFrameEncoder {
    fn write(&mut self, ctx: &mut StageContext<'_>, msg: Message, promise: Option<WritePromise>) -> Result<()> {
        match msg {
            Message::Frame(frame) => match encode_legacy_frame(&frame) {
                Ok(bytes) => ctx.write_with_promise(bytes, promise),
                Err(error) => {
                    crate::log_debug!(
                        "{} dropped {} frame, not representable in legacy framing",
                        ctx.connection_id(),
                        frame.opcode.name()
                    );
                    if let Some(promise) = promise {
                        promise.fail(error);
                    }
                }
            },
            other => ctx.write_with_promise(other, promise),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_text_frame() {
        let mut buf = BytesMut::from(&b"\x00hello\xff\x00wor"[..]);
        let frame = parse_legacy_frame(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(frame.as_text(), Some("hello"));
        assert!(parse_legacy_frame(&mut buf, 1024).unwrap().is_none());
        assert_eq!(buf.as_ref(), b"\x00wor");
    }

    #[test]
    fn test_close_frame() {
        let mut buf = BytesMut::from(&b"\xff\x00"[..]);
        let frame = parse_legacy_frame(&mut buf, 1024).unwrap().unwrap();
        assert!(frame.is_close());
        assert!(buf.is_empty());
        assert_eq!(encode_legacy_frame(&Frame::close(None)).unwrap().as_ref(), b"\xff\x00");
    }

    #[test]
    fn test_binary_length_prefix() {
        let payload = vec![7u8; 200];
        let encoded = encode_legacy_frame(&Frame::binary(payload.clone())).unwrap();
        // 200 = 0b1_1001000 -> 0x81 0x48
        assert_eq!(&encoded[..3], &[0x80, 0x81, 0x48]);

        let mut buf = BytesMut::from(encoded.as_ref());
        let frame = parse_legacy_frame(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(frame.payload.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_unterminated_text_too_large() {
        let mut buf = BytesMut::from(&b"\x00abcdefgh"[..]);
        assert!(matches!(
            parse_legacy_frame(&mut buf, 4),
            Err(Error::Frame(FrameError::TooLarge { .. }))
        ));
    }

    #[test]
    fn test_ping_not_representable() {
        assert!(encode_legacy_frame(&Frame::ping("x")).is_err());
    }
}
