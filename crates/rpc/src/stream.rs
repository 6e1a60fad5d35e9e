use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bufnet_metadata::Metadata;
use bufnet_worker::{Bridge, CallContext, TaskClass};
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::engine::{EngineError, EngineStream, RpcEngine};
use crate::status::RpcStatus;
use crate::types::{RpcResult, StreamEnd, StreamItem, StreamKind};
use crate::{Error, Pending, Result};

/// Lifecycle of a [`StreamSession`]. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
	/// Both halves open.
	Open,
	/// The local side finished sending.
	HalfClosedLocal,
	/// Closed locally, or the call finished.
	Closed,
}

/// Runs outbound operations in the order they were issued.
///
/// Each `send`/`close_send` draws a ticket when called and its unit waits for
/// that ticket's turn before touching the engine.
#[derive(Debug, Default)]
struct SendLane {
	issued: Mutex<u64>,
	turn: Mutex<u64>,
	advanced: Condvar,
}

impl SendLane {
	/// Draws a ticket and submits with it. Holding the ticket lock while
	/// submitting keeps submission order equal to ticket order.
	fn enqueue<T>(&self, submit: impl FnOnce(u64) -> T) -> T {
		let mut issued = self.issued.lock();
		let ticket = *issued;
		*issued += 1;
		submit(ticket)
	}

	fn wait_turn(&self, ticket: u64) -> LaneTurn<'_> {
		let mut turn = self.turn.lock();
		while *turn != ticket {
			self.advanced.wait(&mut turn);
		}
		LaneTurn { lane: self }
	}
}

/// Holds the lane until dropped.
struct LaneTurn<'a> {
	lane: &'a SendLane,
}

impl Drop for LaneTurn<'_> {
	fn drop(&mut self) {
		*self.lane.turn.lock() += 1;
		self.lane.advanced.notify_all();
	}
}

struct Session {
	kind: StreamKind,
	method: String,
	stream: Box<dyn EngineStream>,
	bridge: Bridge,
	ctx: CallContext,
	state: Mutex<StreamState>,
	finished: Arc<AtomicBool>,
	terminal: OnceLock<StreamEnd>,
	/// Messages received so far; also serializes `recv`.
	received: Mutex<u64>,
	lane: SendLane,
}

impl Session {
	fn is_closed(&self) -> bool {
		*self.state.lock() == StreamState::Closed
	}

	fn is_finished(&self) -> bool {
		self.finished.load(Ordering::Acquire)
	}

	fn ensure_open(&self) -> Result<()> {
		if self.is_closed() { Err(Error::StreamClosed) } else { Ok(()) }
	}

	fn close(&self) {
		{
			let mut state = self.state.lock();
			if *state == StreamState::Closed {
				return;
			}
			*state = StreamState::Closed;
		}
		self.ctx.cancel();
		tracing::debug!(method = %self.method, "rpc.stream.close");
	}

	fn send(&self, message: Bytes) -> Result<()> {
		self.ensure_open()?;
		if self.is_finished() {
			return Err(Error::StreamClosed);
		}
		if let Err(err) = self.stream.send(message) {
			return Err(self.refusal(err));
		}
		if self.kind == StreamKind::Server {
			self.half_close()?;
		}
		self.ensure_open()
	}

	fn refusal(&self, err: EngineError) -> Error {
		match err {
			_ if self.is_closed() => Error::StreamClosed,
			EngineError::Status(_) => err.into(),
			_ if self.is_finished() => Error::StreamClosed,
			_ => err.into(),
		}
	}

	fn half_close(&self) -> Result<()> {
		let mut state = self.state.lock();
		match *state {
			StreamState::Closed => Err(Error::StreamClosed),
			StreamState::HalfClosedLocal => Ok(()),
			StreamState::Open => {
				self.stream.close_send()?;
				*state = StreamState::HalfClosedLocal;
				tracing::trace!(method = %self.method, "rpc.stream.close_send");
				Ok(())
			}
		}
	}

	fn recv(&self) -> Result<StreamItem> {
		let mut received = self.received.lock();
		if let Some(end) = self.terminal.get() {
			return Ok(StreamItem::End(end.clone()));
		}

		let single = self.kind == StreamKind::Client;
		let item = match self.stream.recv() {
			Ok(Some(_)) if single && *received >= 1 => {
				self.ctx.cancel();
				StreamItem::End(StreamEnd {
					trailer: Metadata::new(),
					status: RpcStatus::extra_response(),
				})
			}
			Ok(Some(message)) => {
				*received += 1;
				StreamItem::Message(message)
			}
			Ok(None) => StreamItem::End(StreamEnd {
				trailer: self.stream.trailer(),
				status: if single && *received == 0 {
					RpcStatus::missing_response()
				} else {
					RpcStatus::ok()
				},
			}),
			Err(EngineError::Status(status)) => StreamItem::End(StreamEnd {
				trailer: self.stream.trailer(),
				status,
			}),
			Err(err) => return Err(err.into()),
		};

		if self.is_closed() {
			let end = self.terminal.get_or_init(StreamEnd::cancelled);
			return Ok(StreamItem::End(end.clone()));
		}
		if let StreamItem::End(end) = &item {
			tracing::trace!(method = %self.method, code = ?end.status.code, "rpc.stream.end");
			let _ = self.terminal.set(end.clone());
		}
		Ok(item)
	}

	/// Reads the single response of a client-streaming exchange.
	fn collect_single(&self) -> Result<RpcResult> {
		let (response, end) = match self.recv()? {
			StreamItem::Message(response) => match self.recv()? {
				StreamItem::End(end) => (response, end),
				StreamItem::Message(_) => {
					self.ctx.cancel();
					let end = StreamEnd {
						trailer: Metadata::new(),
						status: RpcStatus::extra_response(),
					};
					(Bytes::new(), end)
				}
			},
			StreamItem::End(end) => (Bytes::new(), end),
		};
		let header = self.stream.header()?;
		self.ensure_open()?;

		let response = if end.status.is_ok() { response } else { Bytes::new() };
		Ok(RpcResult {
			header,
			trailer: end.trailer,
			response,
			status: end.status,
		})
	}
}

/// Handle to one streaming call.
///
/// Every operation returns its own [`Pending`]. Exactly one outstanding
/// `recv` is supported; `header` and `close_send` may run alongside it.
/// Dropping the handle cancels the call.
pub struct StreamSession {
	inner: Arc<Session>,
}

impl StreamSession {
	pub(crate) fn open(
		engine: &dyn RpcEngine,
		bridge: Bridge,
		base: &CallContext,
		kind: StreamKind,
		method: String,
		metadata: &Metadata,
	) -> Result<Self> {
		let finished = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&finished);
		let (ctx, on_finish) = base.with_finish_hook(move || flag.store(true, Ordering::Release));
		let stream = engine.open_stream(&ctx, kind, &method, metadata, on_finish)?;
		tracing::debug!(kind = kind.as_str(), method = %method, "rpc.stream.open");

		Ok(Self {
			inner: Arc::new(Session {
				kind,
				method,
				stream,
				bridge,
				ctx,
				state: Mutex::new(StreamState::Open),
				finished,
				terminal: OnceLock::new(),
				received: Mutex::new(0),
				lane: SendLane::default(),
			}),
		})
	}

	/// Opens a server-streaming call and sends its only request.
	pub(crate) fn open_with_request(
		engine: &dyn RpcEngine,
		bridge: Bridge,
		base: &CallContext,
		method: String,
		metadata: &Metadata,
		request: Bytes,
	) -> Result<Self> {
		let session = Self::open(engine, bridge, base, StreamKind::Server, method, metadata)?;
		session.inner.send(request)?;
		Ok(session)
	}

	/// Shape of the call.
	pub fn kind(&self) -> StreamKind {
		self.inner.kind
	}

	/// Full method path.
	pub fn method(&self) -> &str {
		&self.inner.method
	}

	/// Current state. A finished call reports [`StreamState::Closed`].
	pub fn state(&self) -> StreamState {
		if self.inner.is_finished() {
			StreamState::Closed
		} else {
			*self.inner.state.lock()
		}
	}

	/// Resolves to the responder's leading metadata, or to empty metadata if
	/// the stream ended without any.
	pub fn header(&self) -> Pending<Metadata> {
		if self.inner.is_closed() {
			return Pending::ready(Err(Error::StreamClosed));
		}
		let inner = Arc::clone(&self.inner);
		self.inner.bridge.submit(TaskClass::Stream, move || {
			let header = inner.stream.header();
			inner.ensure_open()?;
			Ok(header?)
		})
	}

	/// Sends one message. Messages are delivered in the order `send` was called.
	pub fn send(&self, message: Bytes) -> Pending<()> {
		if self.inner.is_closed() {
			return Pending::ready(Err(Error::StreamClosed));
		}
		let inner = Arc::clone(&self.inner);
		self.inner.lane.enqueue(|ticket| {
			self.inner.bridge.submit(TaskClass::Stream, move || {
				let _turn = inner.lane.wait_turn(ticket);
				inner.send(message)
			})
		})
	}

	/// Ends the outbound half after every earlier `send`. Idempotent.
	pub fn close_send(&self) -> Pending<()> {
		if self.inner.is_closed() {
			return Pending::ready(Err(Error::StreamClosed));
		}
		let inner = Arc::clone(&self.inner);
		self.inner.lane.enqueue(|ticket| {
			self.inner.bridge.submit(TaskClass::Stream, move || {
				let _turn = inner.lane.wait_turn(ticket);
				inner.half_close()
			})
		})
	}

	/// Receives the next message or the terminal record.
	///
	/// Statuses, including local cancellation, arrive as [`StreamItem::End`];
	/// only failures without a status reject. Once a terminal record has been
	/// returned, a later [`Self::close`] does not replace it.
	pub fn recv(&self) -> Pending<StreamItem> {
		if let Some(end) = self.inner.terminal.get() {
			return Pending::ready(Ok(StreamItem::End(end.clone())));
		}
		if self.inner.is_closed() {
			return Pending::ready(Ok(StreamItem::End(StreamEnd::cancelled())));
		}
		let inner = Arc::clone(&self.inner);
		self.inner.bridge.submit(TaskClass::Stream, move || inner.recv())
	}

	/// Cancels the call. Always resolves; repeated calls are no-ops.
	pub fn close(&self) -> Pending<()> {
		self.inner.close();
		Pending::ready(Ok(()))
	}

	/// Half-closes, then reads the single response and the terminal record of
	/// a client-streaming call.
	pub fn close_and_recv(&self) -> Pending<RpcResult> {
		if self.inner.is_closed() {
			return Pending::ready(Err(Error::StreamClosed));
		}
		let inner = Arc::clone(&self.inner);
		self.inner.lane.enqueue(|ticket| {
			self.inner.bridge.submit(TaskClass::Stream, move || {
				{
					let _turn = inner.lane.wait_turn(ticket);
					inner.half_close()?;
				}
				inner.collect_single()
			})
		})
	}
}

impl Drop for StreamSession {
	fn drop(&mut self) {
		self.inner.close();
	}
}

impl fmt::Debug for StreamSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamSession")
			.field("kind", &self.inner.kind)
			.field("method", &self.inner.method)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}
