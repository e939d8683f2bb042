//! RFC 6455 frame codec stages
//!
//! Installed in place of the HTTP codec once the upgrade succeeds. The
//! decoder enforces the masking direction of the peer's role, the payload
//! bound and message fragmentation order. A violation is reported upstream as
//! [`PipelineEvent::ProtocolViolation`] with the matching close status, so the
//! close handshake decides whether a close frame may still be sent; input is
//! discarded afterwards.

use crate::close::CloseStatus;
use crate::error::{CloseError, Error, FrameError, Result};
use crate::event::PipelineEvent;
use crate::frame::Frame;
use crate::message::Message;
use crate::promise::WritePromise;
use crate::protocol::{Opcode, Role};
use crate::stage::{Stage, StageContext};
use bytes::BytesMut;

/// Close status answering a decoding failure
pub(crate) fn violation_status(error: &Error) -> CloseStatus {
    match error {
        Error::Frame(FrameError::TooLarge { .. }) => CloseStatus::MESSAGE_TOO_BIG,
        Error::Frame(FrameError::InvalidClose(CloseError::InvalidUtf8)) | Error::InvalidUtf8 => {
            CloseStatus::INVALID_PAYLOAD_DATA
        }
        _ => CloseStatus::PROTOCOL_ERROR,
    }
}

/// Turns inbound bytes into [`Frame`]s
#[derive(Debug)]
pub struct WebSocketFrameDecoder {
    buf: BytesMut,
    role: Role,
    max_payload: usize,
    allow_mask_mismatch: bool,
    in_message: bool,
    failed: bool,
}

impl WebSocketFrameDecoder {
    /// Decoder for an endpoint playing `role`
    pub fn new(role: Role, max_payload: usize, allow_mask_mismatch: bool) -> Self {
        Self {
            buf: BytesMut::new(),
            role,
            max_payload,
            allow_mask_mismatch,
            in_message: false,
            failed: false,
        }
    }

    fn check(&mut self, frame: &Frame) -> Result<()> {
        let expect_masked = self.role == Role::Server;
        if frame.masked != expect_masked && !self.allow_mask_mismatch {
            return Err(FrameError::InvalidMasking(if expect_masked {
                "received an unmasked frame from a client".to_string()
            } else {
                "received a masked frame from a server".to_string()
            })
            .into());
        }

        match frame.opcode {
            Opcode::Continuation => {
                if !self.in_message {
                    return Err(FrameError::InvalidFragmentation(
                        "continuation frame without a message in progress".to_string(),
                    )
                    .into());
                }
                self.in_message = !frame.fin;
            }
            Opcode::Text | Opcode::Binary => {
                if self.in_message {
                    return Err(FrameError::InvalidFragmentation(format!(
                        "{} frame inside a fragmented message",
                        frame.opcode.name()
                    ))
                    .into());
                }
                self.in_message = !frame.fin;
            }
            Opcode::Close => {
                CloseStatus::decode(&frame.payload).map_err(FrameError::from)?;
            }
            Opcode::Ping | Opcode::Pong => {}
        }
        Ok(())
    }

    fn decode(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.failed || self.buf.is_empty() {
            return Ok(());
        }

        let frame = match Frame::parse(&mut self.buf, self.max_payload) {
            Ok(frame) => frame,
            Err(Error::Frame(FrameError::InsufficientData { .. })) => return Ok(()),
            Err(error) => return self.fail(ctx, error),
        };
        if let Err(error) = self.check(&frame) {
            return self.fail(ctx, error);
        }

        ctx.fire_read(frame);
        if !self.buf.is_empty() {
            ctx.resume();
        }
        Ok(())
    }

    fn fail(&mut self, ctx: &mut StageContext<'_>, error: Error) -> Result<()> {
        let status = violation_status(&error);
        crate::log_debug!(
            "{} frame decoding failed, closing with {}: {}",
            ctx.connection_id(),
            status,
            error
        );
        self.failed = true;
        self.buf.clear();
        ctx.fire_event(PipelineEvent::ProtocolViolation(status));
        ctx.close();
        Err(error)
    }
}

impl Stage for WebSocketFrameDecoder {
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

/// Serializes outbound [`Frame`]s, masking them when acting as a client
#[derive(Debug)]
pub struct WebSocketFrameEncoder {
    role: Role,
}

impl WebSocketFrameEncoder {
    /// Encoder for an endpoint playing `role`
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Stage for WebSocketFrameEncoder {
    fn write(&mut self, ctx: &mut StageContext<'_>, msg: Message, promise: Option<WritePromise>) -> Result<()> {
        match msg {
            Message::Frame(frame) => {
                let frame = frame.mask(self.role == Role::Client);
                ctx.write_with_promise(frame.to_bytes(), promise);
            }
            other => ctx.write_with_promise(other, promise),
        }
        Ok(())
    }
}
