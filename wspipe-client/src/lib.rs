//! wspipe Client
//!
//! Client side of the WebSocket upgrade: sends the upgrade request when the
//! transport becomes active, verifies the server's `101` and swaps the
//! connection's pipeline over to frame processing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wspipe_client::prelude::*;
//!
//! fn main() -> wspipe_core::Result<()> {
//!     let uri = "ws://localhost:8080/ws".parse::<http::Uri>()
//!         .map_err(|e| Error::Other(e.to_string()))?;
//!     let protocol = WebSocketClientProtocol::new(ClientProtocolConfig::new(uri))?;
//!
//!     let mut pipeline = protocol.new_pipeline()?;
//!     pipeline.fire_active()?;
//!     // the upgrade request is now waiting in `pipeline.read_outbound()`
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wspipe-client/")]

pub mod config;
pub mod handshake;
pub mod protocol;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use config::ClientProtocolConfig;
pub use handshake::{build_request, verify_response, ClientHandshakeCoordinator, ClientHandshakeState};
pub use protocol::WebSocketClientProtocol;
