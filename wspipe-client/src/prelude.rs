//! Prelude module for wspipe Client
//!
//! This module re-exports commonly used types and traits.

pub use crate::config::ClientProtocolConfig;
pub use crate::handshake::{ClientHandshakeCoordinator, ClientHandshakeState};
pub use crate::protocol::WebSocketClientProtocol;
pub use wspipe_core::prelude::*;
