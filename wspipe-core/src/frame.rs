//! WebSocket frame parsing and serialization
//!
//! This module provides frame parsing and serialization following the
//! RFC 6455 base framing protocol. Extensions are not negotiated, so every
//! reserved bit must be clear.

use crate::{
    close::CloseStatus,
    error::{FrameError, Result},
    protocol::{constants::MAX_CONTROL_PAYLOAD, frame::*, Opcode},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Represents a WebSocket frame according to RFC 6455
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message
    pub fin: bool,
    /// Reserved bits (RSV1, RSV2, RSV3)
    pub rsv: [bool; 3],
    /// Frame opcode
    pub opcode: Opcode,
    /// Whether the frame was, or will be, masked on the wire
    pub masked: bool,
    /// Masking key (if present)
    pub mask: Option<[u8; 4]>,
    /// Payload data, always stored unmasked after parsing
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given opcode and payload
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            rsv: [false; 3],
            opcode,
            masked: false,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a continuation frame
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    /// Create a text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Create a binary frame
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    /// Create a close frame, empty when no status is given
    pub fn close(status: Option<&CloseStatus>) -> Self {
        let payload = status.map(CloseStatus::encode).unwrap_or_default();
        Self::new(Opcode::Close, payload)
    }

    /// Create a ping frame
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    /// Create a pong frame
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Set the FIN bit
    pub fn fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Choose a random masking key for the wire (client frames)
    pub fn mask(mut self, enabled: bool) -> Self {
        if enabled && !self.masked {
            self.masked = true;
            self.mask = Some(rand::random::<[u8; 4]>());
        } else if !enabled {
            self.masked = false;
            self.mask = None;
        }
        self
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(14 + self.payload.len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Write the frame to a buffer, masking the payload if a key is set
    pub fn write_to(&self, buf: &mut BytesMut) {
        let first_byte = ((self.fin as u8) << 7)
            | ((self.rsv[0] as u8) << 6)
            | ((self.rsv[1] as u8) << 5)
            | ((self.rsv[2] as u8) << 4)
            | self.opcode.value();
        buf.put_u8(first_byte);

        let payload_len = self.payload.len();
        let mask_bit = if self.mask.is_some() { MASK_BIT } else { 0 };

        if payload_len < 126 {
            buf.put_u8(mask_bit | payload_len as u8);
        } else if payload_len <= u16::MAX as usize {
            buf.put_u8(mask_bit | PAYLOAD_LEN_16);
            buf.put_u16(payload_len as u16);
        } else {
            buf.put_u8(mask_bit | PAYLOAD_LEN_64);
            buf.put_u64(payload_len as u64);
        }

        match self.mask {
            Some(mask) => {
                buf.put_slice(&mask);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask(&mut buf[start..], &mask);
            }
            None => buf.put_slice(&self.payload),
        }
    }

    /// Parse a frame from the front of `buf`.
    ///
    /// Returns `FrameError::InsufficientData` without consuming anything when
    /// the frame is incomplete. The declared payload length is checked against
    /// `max_payload` as soon as the header is readable.
    pub fn parse(buf: &mut BytesMut, max_payload: usize) -> Result<Self> {
        if buf.len() < 2 {
            return Err(FrameError::InsufficientData {
                needed: 2,
                have: buf.len(),
            }
            .into());
        }

        let mut cursor = std::io::Cursor::new(&buf[..]);

        let first_byte = cursor.get_u8();
        let fin = (first_byte & FIN_BIT) != 0;
        let rsv = [
            (first_byte & RSV1_BIT) != 0,
            (first_byte & RSV2_BIT) != 0,
            (first_byte & RSV3_BIT) != 0,
        ];
        let opcode = Opcode::from(first_byte & OPCODE_MASK)
            .ok_or(FrameError::InvalidOpcode(first_byte & OPCODE_MASK))?;

        if rsv.iter().any(|bit| *bit) {
            return Err(FrameError::ReservedBitsSet.into());
        }
        if opcode.is_control() && !fin {
            return Err(FrameError::FragmentedControlFrame.into());
        }

        let second_byte = cursor.get_u8();
        let masked = (second_byte & MASK_BIT) != 0;
        let mut payload_len = (second_byte & PAYLOAD_LEN_MASK) as u64;

        if payload_len == PAYLOAD_LEN_16 as u64 {
            if buf.len() < 4 {
                return Err(FrameError::InsufficientData {
                    needed: 4,
                    have: buf.len(),
                }
                .into());
            }
            payload_len = cursor.get_u16() as u64;
        } else if payload_len == PAYLOAD_LEN_64 as u64 {
            if buf.len() < 10 {
                return Err(FrameError::InsufficientData {
                    needed: 10,
                    have: buf.len(),
                }
                .into());
            }
            payload_len = cursor.get_u64();
        }

        if opcode.is_control() && payload_len > MAX_CONTROL_PAYLOAD as u64 {
            return Err(FrameError::InvalidHeader(format!(
                "{} frame payload of {} bytes exceeds {}",
                opcode.name(),
                payload_len,
                MAX_CONTROL_PAYLOAD
            ))
            .into());
        }
        if payload_len > max_payload as u64 {
            return Err(FrameError::TooLarge {
                size: usize::try_from(payload_len).unwrap_or(usize::MAX),
                max: max_payload,
            }
            .into());
        }
        let payload_len = payload_len as usize;

        let header_len = cursor.position() as usize + if masked { 4 } else { 0 };
        if buf.len() < header_len + payload_len {
            return Err(FrameError::InsufficientData {
                needed: header_len + payload_len,
                have: buf.len(),
            }
            .into());
        }

        let mask = if masked {
            let mut mask = [0u8; 4];
            cursor.copy_to_slice(&mut mask);
            Some(mask)
        } else {
            None
        };

        buf.advance(header_len);
        let mut payload = buf.split_to(payload_len);
        if let Some(mask) = mask {
            apply_mask(&mut payload, &mask);
        }

        Ok(Frame {
            fin,
            rsv,
            opcode,
            masked,
            mask,
            payload: payload.freeze(),
        })
    }

    /// Payload as text, if this is a text frame holding valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        match self.opcode {
            Opcode::Text | Opcode::Continuation => std::str::from_utf8(&self.payload).ok(),
            _ => None,
        }
    }

    /// Get the payload length
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Check if this is a control frame
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Check if this is a data frame
    pub fn is_data(&self) -> bool {
        self.opcode.is_data()
    }

    /// Check if this is a close frame
    pub fn is_close(&self) -> bool {
        self.opcode == Opcode::Close
    }

    /// Check if this is the final frame
    pub fn is_final(&self) -> bool {
        self.fin
    }
}

/// XOR `data` in place with the 4-byte masking key
fn apply_mask(data: &mut [u8], mask: &[u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_text_frame_serialization() {
        let frame = Frame::text("hello");
        let bytes = frame.to_bytes();

        assert_eq!(bytes[0], 0x81); // FIN=1, RSV=000, Opcode=0001
        assert_eq!(bytes[1], 0x05); // MASK=0, Length=5
        assert_eq!(&bytes[2..], b"hello");
    }

    #[test]
    fn test_masked_frame() {
        let frame = Frame::text("hello").mask(true);
        let bytes = frame.to_bytes();

        assert_eq!(bytes[1] & 0x80, 0x80);
        assert_eq!(bytes.len(), 2 + 4 + 5);

        let mut buf = BytesMut::from(&bytes[..]);
        let parsed = Frame::parse(&mut buf, 1024).unwrap();
        assert!(parsed.masked);
        assert_eq!(parsed.payload, "hello");
    }

    #[test]
    fn test_frame_parsing_leaves_trailing_bytes() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::text("hello").to_bytes());
        buf.extend_from_slice(&Frame::ping("p").to_bytes()[..1]);

        let parsed = Frame::parse(&mut buf, 1024).unwrap();
        assert_eq!(parsed.opcode, Opcode::Text);
        assert_eq!(parsed.as_text(), Some("hello"));
        assert_eq!(buf.len(), 1);
        assert!(matches!(
            Frame::parse(&mut buf, 1024),
            Err(Error::Frame(FrameError::InsufficientData { .. }))
        ));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_large_frame() {
        let frame = Frame::binary(vec![0u8; 65536]);
        let bytes = frame.to_bytes();

        assert_eq!(bytes[1], 127);
        assert_eq!(bytes[2..10], (65536u64).to_be_bytes());
    }

    #[test]
    fn test_too_large_detected_from_header() {
        let bytes = Frame::binary(vec![0u8; 300]).to_bytes();
        let mut buf = BytesMut::from(&bytes[..4]);
        assert!(matches!(
            Frame::parse(&mut buf, 256),
            Err(Error::Frame(FrameError::TooLarge { size: 300, max: 256 }))
        ));
    }

    #[test]
    fn test_close_frame() {
        let status = CloseStatus::new(1000, "Goodbye").unwrap();
        let bytes = Frame::close(Some(&status)).to_bytes();

        assert_eq!(bytes[0], 0x88);
        assert_eq!(bytes[1], 0x09);
        assert_eq!(&bytes[2..4], 1000u16.to_be_bytes());
        assert_eq!(&bytes[4..], b"Goodbye");
    }

    #[test]
    fn test_control_frame_rules() {
        let mut fragmented = BytesMut::from(&[0x09u8, 0x00][..]);
        assert!(matches!(
            Frame::parse(&mut fragmented, 1024),
            Err(Error::Frame(FrameError::FragmentedControlFrame))
        ));

        let mut reserved = BytesMut::from(&[0xC1u8, 0x00][..]);
        assert!(matches!(
            Frame::parse(&mut reserved, 1024),
            Err(Error::Frame(FrameError::ReservedBitsSet))
        ));

        let mut big_ping = BytesMut::from(&Frame::ping(vec![0u8; 126]).to_bytes()[..]);
        assert!(matches!(
            Frame::parse(&mut big_ping, 1024),
            Err(Error::Frame(FrameError::InvalidHeader(_)))
        ));
    }
}
