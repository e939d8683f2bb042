//! Close handshake shared by both endpoints
//!
//! The [`CloseHandshakeCoordinator`] sits between the frame codec and the
//! application for the whole life of the connection. Until the upgrade
//! completes it passes everything through; afterwards it tracks the close
//! state, answers pings and peer close frames, and makes sure a close frame
//! precedes a local shutdown.

use crate::close::CloseStatus;
use crate::config::HandshakeConfig;
use crate::error::{Error, Result};
use crate::event::PipelineEvent;
use crate::frame::Frame;
use crate::handshaker::HandshakerRegistry;
use crate::message::Message;
use crate::promise::WritePromise;
use crate::protocol::Opcode;
use crate::stage::{Stage, StageContext};
use crate::timer::TimerId;
use std::sync::Arc;

/// Close handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseState {
    /// No close frame exchanged
    #[default]
    Open,
    /// A close frame was sent, the peer's is outstanding
    CloseSent,
    /// The peer's close frame arrived, ours is outstanding
    CloseReceived,
    /// Both sides are done
    Closed,
}

impl CloseState {
    /// Any state but `Open`
    pub fn is_closing(&self) -> bool {
        !matches!(self, CloseState::Open)
    }

    /// Whether this endpoint may still send a close frame
    pub fn can_send_close(&self) -> bool {
        matches!(self, CloseState::Open | CloseState::CloseReceived)
    }

    /// Transition for a close frame leaving this endpoint
    pub fn on_sent(self) -> Self {
        match self {
            CloseState::Open => CloseState::CloseSent,
            CloseState::CloseReceived => CloseState::Closed,
            other => other,
        }
    }

    /// Transition for a close frame arriving from the peer
    pub fn on_received(self) -> Self {
        match self {
            CloseState::Open => CloseState::CloseReceived,
            CloseState::CloseSent => CloseState::Closed,
            other => other,
        }
    }
}

/// Stage running the close handshake
#[derive(Debug)]
pub struct CloseHandshakeCoordinator {
    config: Arc<HandshakeConfig>,
    registry: Option<HandshakerRegistry>,
    state: CloseState,
    upgraded: bool,
    force_close: Option<TimerId>,
}

impl CloseHandshakeCoordinator {
    /// Coordinator using the close policy of `config`
    pub fn new(config: Arc<HandshakeConfig>) -> Self {
        Self {
            config,
            registry: None,
            state: CloseState::Open,
            upgraded: false,
            force_close: None,
        }
    }

    /// Forget the connection's handshaker in `registry` once the transport goes away
    pub fn with_registry(mut self, registry: HandshakerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn cancel_force_close(&mut self, ctx: &mut StageContext<'_>) {
        if let Some(timer) = self.force_close.take() {
            ctx.cancel(timer);
        }
    }

    fn read_close(&mut self, ctx: &mut StageContext<'_>, frame: Frame) -> Result<()> {
        if matches!(self.state, CloseState::CloseReceived | CloseState::Closed) {
            crate::log_trace!("{} duplicate close frame dropped", ctx.connection_id());
            return Ok(());
        }
        // the frame decoder already rejected malformed payloads
        let status = CloseStatus::decode(&frame.payload).ok().flatten();

        if !self.config.handle_close_frames {
            self.state = self.state.on_received();
            ctx.fire_read(frame);
            return Ok(());
        }

        if self.state == CloseState::Open {
            let echo = status.clone().unwrap_or(CloseStatus::NORMAL_CLOSURE);
            ctx.write(echo.to_frame());
        }
        crate::log_debug!(
            "{} close handshake finished, peer status {:?}",
            ctx.connection_id(),
            status
        );
        self.state = CloseState::Closed;
        self.cancel_force_close(ctx);
        ctx.fire_event(PipelineEvent::CloseReceived(status));
        ctx.close();
        Ok(())
    }

    fn fail_connection(&mut self, ctx: &mut StageContext<'_>, status: CloseStatus) {
        if self.state.can_send_close() {
            crate::log_debug!(
                "{} closing with {} after a protocol violation",
                ctx.connection_id(),
                status
            );
            ctx.write(status.to_frame());
        } else {
            crate::log_trace!(
                "{} close frame already sent, violation not answered",
                ctx.connection_id()
            );
        }
        self.state = CloseState::Closed;
        self.cancel_force_close(ctx);
    }

    fn write_close(&mut self, ctx: &mut StageContext<'_>, frame: Frame, promise: Option<WritePromise>) {
        if !self.state.can_send_close() {
            crate::log_trace!("{} close frame already sent", ctx.connection_id());
            if let Some(promise) = promise {
                promise.succeed();
            }
            return;
        }

        let finished = self.state == CloseState::CloseReceived;
        self.state = self.state.on_sent();
        ctx.write_with_promise(frame, promise);

        if finished {
            ctx.close();
        } else if let Some(timeout) = self.config.force_close_timeout {
            self.force_close = Some(ctx.schedule(timeout));
        }
    }
}

impl Stage for CloseHandshakeCoordinator {
    fn event(&mut self, ctx: &mut StageContext<'_>, event: PipelineEvent) -> Result<()> {
        let violation = match &event {
            PipelineEvent::HandshakeComplete(_) => {
                self.upgraded = true;
                None
            }
            PipelineEvent::ProtocolViolation(status) => Some(status.clone()),
            _ => None,
        };

        if let Some(status) = violation {
            self.fail_connection(ctx, status);
            ctx.fire_event(event);
            ctx.close();
            return Ok(());
        }
        ctx.fire_event(event);
        Ok(())
    }

    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        let frame = match msg {
            Message::Frame(frame) if self.upgraded => frame,
            other => {
                ctx.fire_read(other);
                return Ok(());
            }
        };

        match frame.opcode {
            Opcode::Close => self.read_close(ctx, frame),
            Opcode::Ping => {
                if !self.state.is_closing() {
                    ctx.write(Frame::pong(frame.payload));
                }
                Ok(())
            }
            Opcode::Pong => {
                if !self.config.drop_pong_frames && !self.state.is_closing() {
                    ctx.fire_read(frame);
                }
                Ok(())
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                if self.state.is_closing() {
                    crate::log_trace!(
                        "{} {} frame dropped while closing",
                        ctx.connection_id(),
                        frame.opcode.name()
                    );
                } else {
                    ctx.fire_read(frame);
                }
                Ok(())
            }
        }
    }

    fn write(&mut self, ctx: &mut StageContext<'_>, msg: Message, promise: Option<WritePromise>) -> Result<()> {
        let frame = match msg {
            Message::Frame(frame) if self.upgraded => frame,
            other => {
                ctx.write_with_promise(other, promise);
                return Ok(());
            }
        };

        if frame.opcode == Opcode::Close {
            self.write_close(ctx, frame, promise);
        } else if self.state.is_closing() {
            if let Some(promise) = promise {
                promise.fail(Error::Closed(frame.opcode.name()));
            }
        } else {
            ctx.write_with_promise(frame, promise);
        }
        Ok(())
    }

    fn close(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        if self.upgraded && self.state.can_send_close() {
            if let Some(status) = self.config.send_close_frame.clone() {
                crate::log_debug!("{} sending {} before shutdown", ctx.connection_id(), status);
                self.state = self.state.on_sent();
                ctx.write(status.to_frame());
            }
        }
        self.cancel_force_close(ctx);
        ctx.close();
        Ok(())
    }

    fn timer(&mut self, ctx: &mut StageContext<'_>, timer: TimerId) -> Result<()> {
        if self.force_close != Some(timer) {
            return Ok(());
        }
        self.force_close = None;
        crate::log_debug!(
            "{} peer did not answer the close frame, forcing shutdown",
            ctx.connection_id()
        );
        self.state = CloseState::Closed;
        ctx.close();
        Ok(())
    }

    fn channel_inactive(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.cancel_force_close(ctx);
        if let Some(registry) = &self.registry {
            registry.remove(ctx.connection_id());
        }
        ctx.fire_inactive();
        Ok(())
    }
}
