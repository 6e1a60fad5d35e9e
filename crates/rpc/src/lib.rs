//! Blocking-RPC to async bridge over an in-memory transport.
//!
//! Hosts hand requests to this crate and get [`Pending`] values back; the
//! blocking engine work runs off the host thread:
//! * [`Listener`]: one transport instance with its runtime, scope, and pipe
//! * [`Connection`]: unary calls and stream openers on top of an [`engine::RpcEngine`]
//! * [`StreamSession`]: the per-stream state machine
//! * [`host`]: JSON-valued adapter for hosts without Rust types
//!
//! RPC failures that carry a status are data, not errors: they come back in
//! [`RpcResult::status`] or [`StreamEnd::status`].

#![warn(missing_docs)]

pub mod codec;
mod config;
mod conn;
mod convert;
pub mod engine;
mod error;
pub mod host;
mod listener;
mod status;
mod stream;
pub mod transport;
mod types;

pub use bufnet_metadata::Metadata;
pub use config::{BridgeConfig, DEFAULT_BUFFER_SIZE, RuntimeConfig};
pub use conn::Connection;
pub use error::{Error, Pending, Result};
pub use listener::Listener;
pub use status::RpcStatus;
pub use stream::{StreamSession, StreamState};
pub use types::{CallOptions, RpcResult, StreamEnd, StreamItem, StreamKind};
