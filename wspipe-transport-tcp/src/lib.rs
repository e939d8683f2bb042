//! TCP Transport for wspipe
//!
//! Runs a [`Pipeline`](wspipe_core::pipeline::Pipeline) over a tokio TCP
//! socket: bytes read from the socket enter the head of the chain and bytes
//! that reach the head are written back.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wspipe-transport-tcp/")]

pub mod tcp;

// Re-export TCP transport types
pub use tcp::{Connection, ConnectionHandle, Delivery, TcpTransport};

/// Prelude module
pub mod prelude {
    pub use crate::tcp::{Connection, ConnectionHandle, Delivery, TcpTransport};
}
