use std::sync::Arc;

use bufnet_metadata::Metadata;
use bufnet_worker::{CallContext, FinishHook};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::Streaming;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{Code, Request};

use super::{EngineError, EngineStream, RpcEngine, UnaryReply};
use crate::codec::PassThroughCodec;
use crate::convert::{from_metadata_map, to_metadata_map};
use crate::status::RpcStatus;
use crate::types::StreamKind;

type HeaderState = Option<Result<Metadata, EngineError>>;

/// [`RpcEngine`] backed by a tonic [`Channel`].
///
/// Blocking operations are driven on `handle`; each stream additionally owns
/// a driver task that pumps responses into a bounded queue.
#[derive(Debug, Clone)]
pub struct TonicEngine {
	channel: Channel,
	handle: Handle,
	stream_capacity: usize,
}

impl TonicEngine {
	/// Wraps `channel`, driving calls on `handle` with `stream_capacity`
	/// messages buffered per stream direction.
	pub fn new(channel: Channel, handle: Handle, stream_capacity: usize) -> Self {
		Self {
			channel,
			handle,
			stream_capacity: stream_capacity.max(1),
		}
	}
}

fn parse_path(method: &str) -> Result<PathAndQuery, EngineError> {
	method
		.parse::<PathAndQuery>()
		.map_err(|err| EngineError::Invalid(format!("method {method:?} is not a valid path: {err}")))
}

/// Splits tonic statuses into server-reported ones and local transport
/// failures. The latter always carry a source error.
fn classify(status: &tonic::Status) -> EngineError {
	if std::error::Error::source(status).is_some() {
		EngineError::Transport(status.to_string())
	} else {
		EngineError::Status(RpcStatus::from(status))
	}
}

fn transport(err: impl std::fmt::Display) -> EngineError {
	EngineError::Transport(err.to_string())
}

/// How a call ended, with whatever trailer arrived.
#[derive(Debug, Clone)]
struct Finish<T> {
	trailer: Metadata,
	result: Result<T, EngineError>,
}

impl<T> Finish<T> {
	fn ok(trailer: Metadata, value: T) -> Self {
		Self {
			trailer,
			result: Ok(value),
		}
	}

	fn failed(status: RpcStatus) -> Self {
		Self {
			trailer: Metadata::new(),
			result: Err(EngineError::Status(status)),
		}
	}

	fn from_status(status: &tonic::Status) -> Self {
		Self {
			trailer: from_metadata_map(status.metadata()),
			result: Err(classify(status)),
		}
	}

	fn is_cancelled(&self) -> bool {
		matches!(&self.result, Err(EngineError::Status(status)) if status.code == Code::Cancelled)
	}
}

async fn trailers<T>(messages: &mut Streaming<Bytes>, value: T) -> Finish<T> {
	match messages.trailers().await {
		Ok(trailer) => Finish::ok(trailer.map(|map| from_metadata_map(&map)).unwrap_or_default(), value),
		Err(status) => Finish::from_status(&status),
	}
}

async fn unary(
	grpc: &mut Grpc<Channel>,
	request: Request<tokio_stream::Once<Bytes>>,
	path: PathAndQuery,
	header: &mut Metadata,
) -> Finish<Bytes> {
	if let Err(err) = grpc.ready().await {
		return Finish {
			trailer: Metadata::new(),
			result: Err(transport(err)),
		};
	}
	let response = match grpc.streaming(request, path, PassThroughCodec).await {
		Ok(response) => response,
		Err(status) => return Finish::from_status(&status),
	};
	let (md, mut messages, _) = response.into_parts();
	*header = from_metadata_map(&md);

	let message = match messages.message().await {
		Ok(Some(message)) => message,
		Ok(None) => {
			let finish = trailers(&mut messages, ()).await;
			return match finish.result {
				Ok(()) => Finish {
					trailer: finish.trailer,
					result: Err(EngineError::Status(RpcStatus::missing_response())),
				},
				Err(err) => Finish {
					trailer: finish.trailer,
					result: Err(err),
				},
			};
		}
		Err(status) => return Finish::from_status(&status),
	};
	match messages.message().await {
		Ok(None) => trailers(&mut messages, message).await,
		Ok(Some(_)) => Finish::failed(RpcStatus::extra_response()),
		Err(status) => Finish::from_status(&status),
	}
}

impl RpcEngine for TonicEngine {
	fn invoke(&self, ctx: &CallContext, method: &str, request: Bytes, metadata: &Metadata) -> Result<UnaryReply, EngineError> {
		let path = parse_path(method)?;
		let mut request = Request::new(tokio_stream::once(request));
		*request.metadata_mut() = to_metadata_map(metadata)?;
		let mut grpc = Grpc::new(self.channel.clone());
		let mut header = Metadata::new();

		let finish = self.handle.block_on(async {
			tokio::select! {
				biased;
				_ = ctx.cancelled() => Finish::failed(RpcStatus::cancelled()),
				finish = unary(&mut grpc, request, path, &mut header) => finish,
			}
		});

		let outcome = match finish.result {
			Ok(response) => Ok(response),
			Err(EngineError::Status(status)) => Err(status),
			Err(err) => return Err(err),
		};
		Ok(UnaryReply {
			header,
			trailer: finish.trailer,
			outcome,
		})
	}

	fn open_stream(
		&self,
		ctx: &CallContext,
		kind: StreamKind,
		method: &str,
		metadata: &Metadata,
		on_finish: FinishHook,
	) -> Result<Box<dyn EngineStream>, EngineError> {
		let path = parse_path(method)?;
		let (outbound_tx, outbound_rx) = mpsc::channel(self.stream_capacity);
		let (inbound_tx, inbound_rx) = mpsc::channel(self.stream_capacity);
		let mut request = Request::new(ReceiverStream::new(outbound_rx));
		*request.metadata_mut() = to_metadata_map(metadata)?;

		let mut grpc = Grpc::new(self.channel.clone());
		self.handle.block_on(async {
			tokio::select! {
				biased;
				_ = ctx.cancelled() => Err(EngineError::Status(RpcStatus::cancelled())),
				ready = grpc.ready() => ready.map_err(transport),
			}
		})?;

		let (header_tx, header_rx) = watch::channel(None);
		let end = Arc::new(Mutex::new(None));
		let driver = Driver {
			grpc,
			path,
			request,
			inbound: inbound_tx,
			header: header_tx,
			end: Arc::clone(&end),
			ctx: ctx.clone(),
			on_finish,
		};
		tracing::trace!(kind = kind.as_str(), method, "rpc.stream.establish");
		self.handle.spawn(driver.run());

		Ok(Box::new(TonicStream {
			handle: self.handle.clone(),
			ctx: ctx.clone(),
			header: header_rx,
			end,
			inbound: tokio::sync::Mutex::new(inbound_rx),
			outbound: Mutex::new(Some(outbound_tx)),
		}))
	}
}

/// Task owning the tonic side of one stream.
struct Driver {
	grpc: Grpc<Channel>,
	path: PathAndQuery,
	request: Request<ReceiverStream<Bytes>>,
	inbound: mpsc::Sender<Bytes>,
	header: watch::Sender<HeaderState>,
	end: Arc<Mutex<Option<Finish<()>>>>,
	ctx: CallContext,
	on_finish: FinishHook,
}

impl Driver {
	async fn run(self) {
		let Self {
			mut grpc,
			path,
			request,
			inbound,
			header,
			end,
			ctx,
			on_finish,
		} = self;

		let finish = tokio::select! {
			biased;
			_ = ctx.cancelled() => Finish::failed(RpcStatus::cancelled()),
			finish = pump(&mut grpc, request, path, &inbound, &header) => finish,
		};

		header.send_if_modified(|state| {
			if state.is_some() {
				return false;
			}
			*state = Some(match &finish.result {
				Err(err @ EngineError::Transport(_)) => Err(err.clone()),
				_ => Ok(Metadata::new()),
			});
			true
		});
		tracing::trace!(
			ok = finish.result.is_ok(),
			cancelled = finish.is_cancelled(),
			"rpc.stream.finish"
		);
		*end.lock() = Some(finish);
		on_finish.finish();
		drop(inbound);
	}
}

async fn pump(
	grpc: &mut Grpc<Channel>,
	request: Request<ReceiverStream<Bytes>>,
	path: PathAndQuery,
	inbound: &mpsc::Sender<Bytes>,
	header: &watch::Sender<HeaderState>,
) -> Finish<()> {
	let response = match grpc.streaming(request, path, PassThroughCodec).await {
		Ok(response) => response,
		Err(status) => return Finish::from_status(&status),
	};
	let (md, mut messages, _) = response.into_parts();
	header.send_replace(Some(Ok(from_metadata_map(&md))));

	loop {
		match messages.message().await {
			Ok(Some(message)) => {
				if inbound.send(message).await.is_err() {
					return Finish::failed(RpcStatus::cancelled());
				}
			}
			Ok(None) => return trailers(&mut messages, ()).await,
			Err(status) => return Finish::from_status(&status),
		}
	}
}

/// Caller side of a stream established by [`TonicEngine`].
struct TonicStream {
	handle: Handle,
	ctx: CallContext,
	header: watch::Receiver<HeaderState>,
	end: Arc<Mutex<Option<Finish<()>>>>,
	inbound: tokio::sync::Mutex<mpsc::Receiver<Bytes>>,
	outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl TonicStream {
	fn driver_stopped() -> EngineError {
		EngineError::Transport("stream driver stopped".to_string())
	}

	/// Error for operations on a stream whose call already ended.
	fn ended(&self) -> EngineError {
		match self.end.lock().as_ref() {
			Some(Finish { result: Err(err), .. }) => err.clone(),
			Some(_) => EngineError::Transport("stream already finished".to_string()),
			None if self.ctx.is_cancelled() => EngineError::Status(RpcStatus::cancelled()),
			None => Self::driver_stopped(),
		}
	}

	fn was_cancelled(&self) -> bool {
		match self.end.lock().as_ref() {
			Some(finish) => finish.is_cancelled(),
			None => self.ctx.is_cancelled(),
		}
	}
}

impl EngineStream for TonicStream {
	fn header(&self) -> Result<Metadata, EngineError> {
		let mut header = self.header.clone();
		self.handle.block_on(async move {
			let state = header.wait_for(Option::is_some).await.map_err(|_| Self::driver_stopped())?;
			match &*state {
				Some(result) => result.clone(),
				None => Ok(Metadata::new()),
			}
		})
	}

	fn send(&self, message: Bytes) -> Result<(), EngineError> {
		if self.was_cancelled() {
			return Err(EngineError::Status(RpcStatus::cancelled()));
		}
		let Some(outbound) = self.outbound.lock().clone() else {
			return Err(EngineError::Status(RpcStatus::new(
				Code::Internal,
				"SendMsg called after CloseSend",
			)));
		};
		let sent = self.handle.block_on(async {
			tokio::select! {
				biased;
				_ = self.ctx.cancelled() => Err(EngineError::Status(RpcStatus::cancelled())),
				sent = outbound.send(message) => sent.map_err(|_| self.ended()),
			}
		});
		if sent.is_err() && self.ctx.is_cancelled() {
			self.outbound.lock().take();
		}
		sent
	}

	fn close_send(&self) -> Result<(), EngineError> {
		if self.was_cancelled() {
			return Err(EngineError::Status(RpcStatus::cancelled()));
		}
		self.outbound.lock().take();
		Ok(())
	}

	fn recv(&self) -> Result<Option<Bytes>, EngineError> {
		let next = self.handle.block_on(async { self.inbound.lock().await.recv().await });
		if let Some(message) = next {
			return Ok(Some(message));
		}
		match self.end.lock().as_ref() {
			Some(finish) => finish.result.clone().map(|()| None),
			None => Err(Self::driver_stopped()),
		}
	}

	fn trailer(&self) -> Metadata {
		self.end.lock().as_ref().map(|finish| finish.trailer.clone()).unwrap_or_default()
	}
}
