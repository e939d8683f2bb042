//! Close status codes and the close frame payload
//!
//! A close frame carries an optional 2-byte big-endian status code followed
//! by an optional UTF-8 reason. [`CloseStatus`] is the (code, reason) pair the
//! close handshake reads and writes; the framing itself belongs to the codec.

use crate::error::CloseError;
use crate::frame::Frame;
use crate::protocol::constants::MAX_CLOSE_REASON_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use std::fmt;

/// Status code plus reason carried by a close frame
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloseStatus {
    code: u16,
    reason: Cow<'static, str>,
}

impl CloseStatus {
    /// 1000, the purpose of the connection has been fulfilled
    pub const NORMAL_CLOSURE: CloseStatus = CloseStatus::known(1000);
    /// 1001, endpoint going away
    pub const ENDPOINT_UNAVAILABLE: CloseStatus = CloseStatus::known(1001);
    /// 1002, protocol violation
    pub const PROTOCOL_ERROR: CloseStatus = CloseStatus::known(1002);
    /// 1003, data type the endpoint cannot accept
    pub const INVALID_MESSAGE_TYPE: CloseStatus = CloseStatus::known(1003);
    /// 1007, payload inconsistent with the message type
    pub const INVALID_PAYLOAD_DATA: CloseStatus = CloseStatus::known(1007);
    /// 1008, policy violation
    pub const POLICY_VIOLATION: CloseStatus = CloseStatus::known(1008);
    /// 1009, message too big to process
    pub const MESSAGE_TOO_BIG: CloseStatus = CloseStatus::known(1009);
    /// 1010, client expected an extension the server did not negotiate
    pub const MANDATORY_EXTENSION: CloseStatus = CloseStatus::known(1010);
    /// 1011, unexpected condition on the server
    pub const INTERNAL_SERVER_ERROR: CloseStatus = CloseStatus::known(1011);
    /// 1012, service restarting
    pub const SERVICE_RESTART: CloseStatus = CloseStatus::known(1012);
    /// 1013, try again later
    pub const TRY_AGAIN_LATER: CloseStatus = CloseStatus::known(1013);
    /// 1014, bad gateway
    pub const BAD_GATEWAY: CloseStatus = CloseStatus::known(1014);

    const fn known(code: u16) -> Self {
        Self {
            code,
            reason: Cow::Borrowed(""),
        }
    }

    /// Create a status, rejecting codes that may not appear on the wire
    pub fn new(code: u16, reason: impl Into<Cow<'static, str>>) -> Result<Self, CloseError> {
        if !Self::is_valid_code(code) {
            return Err(CloseError::InvalidCode { code });
        }
        let reason = reason.into();
        if reason.len() > MAX_CLOSE_REASON_SIZE {
            return Err(CloseError::ReasonTooLong {
                len: reason.len(),
                max: MAX_CLOSE_REASON_SIZE,
            });
        }
        Ok(Self { code, reason })
    }

    /// Same code with a different reason
    pub fn with_reason(&self, reason: impl Into<Cow<'static, str>>) -> Result<Self, CloseError> {
        Self::new(self.code, reason)
    }

    /// Numeric status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Reason text, possibly empty
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Codes allowed in a close frame.
    ///
    /// 1004-1006 and 1015 are reserved for local reporting and never sent;
    /// 1016-2999 are reserved for future protocol use.
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Decode a close frame payload; an empty payload carries no status
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, CloseError> {
        match payload.len() {
            0 => Ok(None),
            1 => Err(CloseError::Truncated { len: 1 }),
            _ => {
                let code = u16::from_be_bytes([payload[0], payload[1]]);
                if !Self::is_valid_code(code) {
                    return Err(CloseError::InvalidCode { code });
                }
                let reason =
                    std::str::from_utf8(&payload[2..]).map_err(|_| CloseError::InvalidUtf8)?;
                Ok(Some(Self {
                    code,
                    reason: Cow::Owned(reason.to_string()),
                }))
            }
        }
    }

    /// Encode as a close frame payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code);
        buf.put_slice(self.reason.as_bytes());
        buf.freeze()
    }

    /// Close frame carrying this status
    pub fn to_frame(&self) -> Frame {
        Frame::close(Some(self))
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes() {
        assert!(CloseStatus::is_valid_code(1000));
        assert!(CloseStatus::is_valid_code(1014));
        assert!(CloseStatus::is_valid_code(4999));
        assert!(!CloseStatus::is_valid_code(999));
        assert!(!CloseStatus::is_valid_code(1005));
        assert!(!CloseStatus::is_valid_code(1006));
        assert!(!CloseStatus::is_valid_code(1015));
        assert!(!CloseStatus::is_valid_code(2000));
        assert!(!CloseStatus::is_valid_code(5000));
    }

    #[test]
    fn test_new_rejects_reserved_and_long_reason() {
        assert_eq!(
            CloseStatus::new(1005, ""),
            Err(CloseError::InvalidCode { code: 1005 })
        );
        let long = "x".repeat(124);
        assert!(matches!(
            CloseStatus::new(1000, long),
            Err(CloseError::ReasonTooLong { len: 124, .. })
        ));
    }

    #[test]
    fn test_payload_encoding() {
        let status = CloseStatus::new(1001, "bye").unwrap();
        let payload = status.encode();
        assert_eq!(&payload[..], &[0x03, 0xE9, b'b', b'y', b'e']);
        assert_eq!(CloseStatus::decode(&payload).unwrap(), Some(status));
    }

    #[test]
    fn test_decode_edge_cases() {
        assert_eq!(CloseStatus::decode(&[]).unwrap(), None);
        assert_eq!(
            CloseStatus::decode(&[0x03]),
            Err(CloseError::Truncated { len: 1 })
        );
        assert_eq!(
            CloseStatus::decode(&[0x03, 0xED]),
            Err(CloseError::InvalidCode { code: 1005 })
        );
        assert_eq!(
            CloseStatus::decode(&[0x03, 0xE8, 0xFF]),
            Err(CloseError::InvalidUtf8)
        );
    }

    #[test]
    fn test_equality_is_code_and_reason() {
        let a = CloseStatus::new(1000, "").unwrap();
        assert_eq!(a, CloseStatus::NORMAL_CLOSURE);
        assert_ne!(a, CloseStatus::new(1000, "done").unwrap());
        assert_eq!(CloseStatus::ENDPOINT_UNAVAILABLE.to_string(), "1001");
    }
}
