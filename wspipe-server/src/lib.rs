//! wspipe Server
//!
//! Server side of the WebSocket upgrade: validates the upgrade request,
//! answers it and swaps the connection's pipeline over to frame processing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wspipe_server::prelude::*;
//!
//! fn main() -> wspipe_core::Result<()> {
//!     let protocol = WebSocketServerProtocol::new(
//!         ServerProtocolConfig::new("/ws").add_subprotocol("chat.v1"),
//!     )?;
//!
//!     let mut pipeline = protocol.new_pipeline()?;
//!     pipeline.fire_active()?;
//!     // feed socket bytes with `pipeline.fire_read(bytes)`
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wspipe-server/")]

// Public modules
pub mod config;
pub mod handshake;
pub mod logging;
pub mod protocol;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use config::ServerProtocolConfig;
pub use handshake::{ServerHandshakeCoordinator, ServerHandshakeState};
pub use logging::init_logging;
pub use protocol::WebSocketServerProtocol;
