//! # wspipe Core
//!
//! Protocol core shared by the wspipe server and client crates.
//!
//! This crate provides:
//!
//! - Error handling and types
//! - Frames, close statuses and protocol constants
//! - Upgrade request validation and the accept token
//! - The stage chain ([`Pipeline`]) connections run on, with its codecs
//! - The close handshake and the registry of completed handshakes

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![doc(html_root_url = "https://docs.rs/wspipe-core/")]

// Logging macros, declared first so every module can use them
#[macro_use]
pub mod logging;

// Protocol modules
pub mod accept;
pub mod close;
pub mod config;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod path;
pub mod protocol;
pub mod validator;

// Stage chain
pub mod close_handshake;
pub mod codec;
pub mod event;
pub mod handshaker;
pub mod message;
pub mod pipeline;
pub mod promise;
pub mod stage;
pub mod timer;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use close::CloseStatus;
pub use close_handshake::{CloseHandshakeCoordinator, CloseState};
pub use config::HandshakeConfig;
pub use error::{Error, HandshakeError, Result};
pub use event::{HandshakeComplete, PipelineEvent};
pub use frame::Frame;
pub use handshake::{HandshakeRequest, HandshakeResponse};
pub use handshaker::{Handshaker, HandshakerRegistry};
pub use message::Message;
pub use path::PathMatch;
pub use pipeline::{ConnectionId, MutationBatch, Pipeline};
pub use promise::{WriteFuture, WritePromise};
pub use protocol::{Opcode, Role, WebSocketVersion};
pub use stage::{Stage, StageContext};
pub use timer::TimerId;
