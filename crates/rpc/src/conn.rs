use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bufnet_worker::{Bridge, CallContext, TaskClass};
use bytes::Bytes;

use crate::engine::RpcEngine;
use crate::stream::StreamSession;
use crate::types::{CallOptions, RpcResult, StreamKind, validate_method};
use crate::{Error, Pending, Result};

struct ConnectionInner {
	engine: Box<dyn RpcEngine>,
	bridge: Bridge,
	base: CallContext,
	closed: AtomicBool,
}

/// Client connection issuing calls through an [`RpcEngine`].
///
/// Cloning is cheap; clones share the engine and the close state. Closing the
/// connection cancels every call and stream opened through it.
#[derive(Clone)]
pub struct Connection {
	inner: Arc<ConnectionInner>,
}

impl Connection {
	/// Wraps `engine`. Calls run as units on `bridge` under children of `base`.
	pub fn new(engine: impl RpcEngine, bridge: Bridge, base: CallContext) -> Self {
		Self {
			inner: Arc::new(ConnectionInner {
				engine: Box::new(engine),
				bridge,
				base,
				closed: AtomicBool::new(false),
			}),
		}
	}

	/// Returns true once [`Self::close`] has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Performs a unary call.
	///
	/// Resolves with the full result for every call that ended with a status,
	/// failed ones included; rejects only when the call could not be made.
	pub fn invoke(&self, method: &str, request: Bytes, options: CallOptions) -> Pending<RpcResult> {
		if let Err(err) = self.admit(method) {
			return Pending::ready(Err(err));
		}
		tracing::trace!(method, "rpc.invoke");

		let inner = Arc::clone(&self.inner);
		let ctx = self.inner.base.child();
		let method = method.to_owned();
		self.inner.bridge.submit(TaskClass::Call, move || {
			let reply = inner.engine.invoke(&ctx, &method, request, &options.metadata)?;
			Ok(RpcResult::from(reply))
		})
	}

	/// Opens a streaming call of the given shape.
	pub fn open_stream(&self, kind: StreamKind, method: &str, options: CallOptions) -> Pending<StreamSession> {
		if let Err(err) = self.admit(method) {
			return Pending::ready(Err(err));
		}

		let inner = Arc::clone(&self.inner);
		let method = method.to_owned();
		self.inner.bridge.submit(TaskClass::StreamOpen, move || {
			StreamSession::open(
				&*inner.engine,
				inner.bridge.clone(),
				&inner.base,
				kind,
				method,
				&options.metadata,
			)
		})
	}

	/// Opens a server-streaming call and sends `request` as its only message.
	///
	/// The returned session is already half-closed.
	pub fn open_server_stream(&self, method: &str, request: Bytes, options: CallOptions) -> Pending<StreamSession> {
		if let Err(err) = self.admit(method) {
			return Pending::ready(Err(err));
		}

		let inner = Arc::clone(&self.inner);
		let method = method.to_owned();
		self.inner.bridge.submit(TaskClass::StreamOpen, move || {
			StreamSession::open_with_request(
				&*inner.engine,
				inner.bridge.clone(),
				&inner.base,
				method,
				&options.metadata,
				request,
			)
		})
	}

	/// Closes the connection. Repeated calls are no-ops.
	pub fn close(&self) -> Pending<()> {
		if !self.inner.closed.swap(true, Ordering::AcqRel) {
			self.inner.base.cancel();
			tracing::debug!("rpc.connection.close");
		}
		Pending::ready(Ok(()))
	}

	fn admit(&self, method: &str) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		validate_method(method)
	}
}

impl fmt::Debug for Connection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Connection").field("closed", &self.is_closed()).finish_non_exhaustive()
	}
}
