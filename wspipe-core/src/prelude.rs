//! Prelude module for wspipe Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::close::CloseStatus;
pub use crate::close_handshake::{CloseHandshakeCoordinator, CloseState};
pub use crate::config::HandshakeConfig;
pub use crate::error::{Error, HandshakeError, Result};
pub use crate::event::{HandshakeComplete, PipelineEvent};
pub use crate::frame::Frame;
pub use crate::handshake::{HandshakeRequest, HandshakeResponse};
pub use crate::handshaker::{Handshaker, HandshakerRegistry};
pub use crate::message::Message;
pub use crate::path::PathMatch;
pub use crate::pipeline::{ConnectionId, MutationBatch, Pipeline};
pub use crate::promise::{WriteFuture, WritePromise};
pub use crate::protocol::{stage_names, Opcode, Role, WebSocketVersion};
pub use crate::stage::{Stage, StageContext};
pub use crate::timer::TimerId;

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};

#[cfg(feature = "serde")]
pub use serde::{Deserialize, Serialize};
