//! Prelude module for wspipe Server
//!
//! This module re-exports commonly used types and traits.

pub use crate::config::ServerProtocolConfig;
pub use crate::handshake::{ServerHandshakeCoordinator, ServerHandshakeState};
pub use crate::protocol::WebSocketServerProtocol;
pub use wspipe_core::prelude::*;
