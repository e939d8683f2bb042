//! Streaming UTF-8 check for text messages
//!
//! Fragmented text messages are validated as one stream: a code point split
//! across frames is carried over and completed by the next continuation.

use crate::close::CloseStatus;
use crate::error::{Error, Result};
use crate::event::PipelineEvent;
use crate::frame::Frame;
use crate::message::Message;
use crate::protocol::Opcode;
use crate::stage::{Stage, StageContext};

/// Rejects text messages that are not valid UTF-8 with close status 1007
#[derive(Debug, Default)]
pub struct Utf8FrameValidator {
    in_text: bool,
    carry: Vec<u8>,
    failed: bool,
}

impl Utf8FrameValidator {
    /// New validator
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&mut self, frame: &Frame) -> bool {
        let tracked = match frame.opcode {
            Opcode::Text => {
                self.in_text = true;
                self.carry.clear();
                true
            }
            Opcode::Continuation => self.in_text,
            _ => false,
        };
        if !tracked {
            return true;
        }

        let valid = self.feed(&frame.payload, frame.fin);
        if frame.fin {
            self.in_text = false;
            self.carry.clear();
        }
        valid
    }

    fn feed(&mut self, payload: &[u8], last: bool) -> bool {
        let mut chunk = std::mem::take(&mut self.carry);
        chunk.extend_from_slice(payload);
        match std::str::from_utf8(&chunk) {
            Ok(_) => true,
            // a truncated sequence at the end may be completed by the next fragment
            Err(error) if error.error_len().is_none() && !last => {
                self.carry = chunk[error.valid_up_to()..].to_vec();
                true
            }
            Err(_) => false,
        }
    }
}

impl Stage for Utf8FrameValidator {
    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        if self.failed {
            return Ok(());
        }
        let Message::Frame(frame) = msg else {
            ctx.fire_read(msg);
            return Ok(());
        };

        if self.check(&frame) {
            ctx.fire_read(frame);
            return Ok(());
        }

        crate::log_debug!("{} invalid UTF-8 in text message", ctx.connection_id());
        self.failed = true;
        ctx.fire_event(PipelineEvent::ProtocolViolation(CloseStatus::INVALID_PAYLOAD_DATA));
        ctx.close();
        Err(Error::InvalidUtf8)
    }
}
