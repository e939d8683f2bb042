//! # wspipe
//!
//! **WebSocket upgrade and close handshakes as state machines on a stage chain**
//!
//! Every connection owns a [`Pipeline`](pipeline::Pipeline): an ordered chain
//! of named stages. The server and client protocol installers put an HTTP
//! codec and a handshake coordinator on that chain; once the upgrade succeeds
//! the coordinator swaps the HTTP stages for the WebSocket frame codec in one
//! step, so bytes that arrived together with the handshake are decoded as
//! frames.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wspipe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let protocol = WebSocketServerProtocol::new(ServerProtocolConfig::new("/ws"))?;
//!     let transport = TcpTransport::bind("127.0.0.1:8080".parse().unwrap()).await?;
//!     transport.serve(move || protocol.new_pipeline()).await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wspipe/")]

// Re-export core components
pub use wspipe_core::*;

#[cfg(feature = "transport-tcp")]
pub use wspipe_transport_tcp as transport_tcp;

#[cfg(feature = "server")]
pub use wspipe_server as server;

#[cfg(feature = "client")]
pub use wspipe_client as client;

/// Prelude module with common imports
pub mod prelude {
    pub use wspipe_core::prelude::*;

    #[cfg(feature = "server")]
    pub use wspipe_server::prelude::*;

    #[cfg(feature = "client")]
    pub use wspipe_client::prelude::*;

    #[cfg(feature = "transport-tcp")]
    pub use wspipe_transport_tcp::prelude::*;
}
