//! Seam between the bridge and the RPC engine.
//!
//! Engine operations are blocking: they run inside bridged units and park the
//! unit's thread until the engine answers. Structured statuses are data;
//! [`EngineError::Transport`] is reserved for failures that produced none.

use bufnet_metadata::Metadata;
use bufnet_worker::{CallContext, FinishHook};
use bytes::Bytes;

use crate::status::RpcStatus;
use crate::types::{RpcResult, StreamKind};

mod grpc;

pub use grpc::TonicEngine;

/// Engine failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
	/// The call failed with a status.
	#[error("{0}")]
	Status(RpcStatus),
	/// The transport failed without a status.
	#[error("transport error: {0}")]
	Transport(String),
	/// The request could not be expressed on the wire.
	#[error("invalid request: {0}")]
	Invalid(String),
}

/// Everything a unary exchange produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryReply {
	/// Leading metadata, empty if none arrived.
	pub header: Metadata,
	/// Trailing metadata, empty if none arrived.
	pub trailer: Metadata,
	/// Response message, or the status the call failed with.
	pub outcome: Result<Bytes, RpcStatus>,
}

impl From<UnaryReply> for RpcResult {
	fn from(reply: UnaryReply) -> Self {
		let (response, status) = match reply.outcome {
			Ok(response) => (response, RpcStatus::ok()),
			Err(status) => (Bytes::new(), status),
		};
		Self {
			header: reply.header,
			trailer: reply.trailer,
			response,
			status,
		}
	}
}

/// Client side of an RPC engine.
pub trait RpcEngine: Send + Sync + 'static {
	/// Performs a unary call, capturing header and trailer.
	///
	/// Returns `Ok` for every call that ended with a status, including
	/// failures and cancellation through `ctx`.
	fn invoke(&self, ctx: &CallContext, method: &str, request: Bytes, metadata: &Metadata) -> Result<UnaryReply, EngineError>;

	/// Establishes a streaming call.
	///
	/// The call lives until `ctx` is cancelled or the responder finishes;
	/// `on_finish` fires exactly once when it ends for any reason.
	fn open_stream(
		&self,
		ctx: &CallContext,
		kind: StreamKind,
		method: &str,
		metadata: &Metadata,
		on_finish: FinishHook,
	) -> Result<Box<dyn EngineStream>, EngineError>;
}

/// One established streaming call.
pub trait EngineStream: Send + Sync + 'static {
	/// Waits for leading metadata. A stream that ends without sending any
	/// yields empty metadata.
	fn header(&self) -> Result<Metadata, EngineError>;

	/// Sends one message, waiting while the outbound queue is full.
	fn send(&self, message: Bytes) -> Result<(), EngineError>;

	/// Ends the outbound half. Repeated calls are no-ops.
	fn close_send(&self) -> Result<(), EngineError>;

	/// Receives the next message; `Ok(None)` marks a clean end.
	fn recv(&self) -> Result<Option<Bytes>, EngineError>;

	/// Trailing metadata; empty until the stream has ended.
	fn trailer(&self) -> Metadata;
}
