use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bufnet_worker::{Bridge, CallContext, RuntimeHost, Scope, TaskClass, join_error_panic_message};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;
use tonic::transport::server::Router;

use crate::config::BridgeConfig;
use crate::conn::Connection;
use crate::engine::TonicEngine;
use crate::transport::{Acceptor, Addr, Dialer, MemoryConnector, pipe};
use crate::{Error, Result};

/// How long [`Listener::wait`] lets the server finish in-flight connections
/// after [`Listener::close`].
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct ListenerInner {
	config: BridgeConfig,
	addr: Addr,
	runtime: RuntimeHost,
	bridge: Bridge,
	base: CallContext,
	dialer: Dialer,
	acceptor: Mutex<Option<Acceptor>>,
	shutdown: CancellationToken,
	server: Mutex<Option<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl Drop for ListenerInner {
	fn drop(&mut self) {
		self.shutdown.cancel();
		self.base.cancel();
	}
}

/// One in-memory transport instance: a runtime, a scope, and the pipe that
/// connections are dialed through.
///
/// Cloning is cheap. The runtime shuts down when the last clone is dropped,
/// abandoning whatever is still outstanding; call [`Self::close`] and
/// [`Self::wait`] first for an orderly teardown.
#[derive(Clone)]
pub struct Listener {
	inner: Arc<ListenerInner>,
}

impl Listener {
	/// Validates `config` and starts the runtime.
	pub fn bind(config: BridgeConfig) -> Result<Self> {
		config.validate()?;
		let runtime =
			RuntimeHost::new(&config.runtime_options()).map_err(|err| Error::Config(format!("cannot start runtime: {err}")))?;
		let addr = Addr::new(&config.authority);
		let (dialer, acceptor) = pipe(addr.clone(), config.buffer_size, config.accept_backlog);
		let bridge = Bridge::new(Scope::new(), runtime.handle().clone());
		tracing::debug!(%addr, buffer_size = config.buffer_size, "listener.bind");

		Ok(Self {
			inner: Arc::new(ListenerInner {
				config,
				addr,
				runtime,
				bridge,
				base: CallContext::new(),
				dialer,
				acceptor: Mutex::new(Some(acceptor)),
				shutdown: CancellationToken::new(),
				server: Mutex::new(None),
				closed: AtomicBool::new(false),
			}),
		})
	}

	/// Stand-in address of the transport.
	pub fn addr(&self) -> &Addr {
		&self.inner.addr
	}

	/// Configuration the listener was bound with.
	pub fn config(&self) -> &BridgeConfig {
		&self.inner.config
	}

	/// Scope accounting for every operation issued through this listener.
	pub fn scope(&self) -> &Scope {
		self.inner.bridge.scope()
	}

	/// Returns true once [`Self::close`] has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Serves `router` on accepted connections until the listener is closed.
	///
	/// A listener serves at most once.
	pub fn serve(&self, router: Router) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ListenerClosed);
		}
		let acceptor = self
			.inner
			.acceptor
			.lock()
			.take()
			.ok_or_else(|| Error::Argument("listener is already serving".into()))?;

		let shutdown = self.inner.shutdown.clone();
		let addr = self.inner.addr.clone();
		tracing::debug!(%addr, "listener.serve");
		let task = self.inner.runtime.spawn(TaskClass::Control, async move {
			let signal = async move { shutdown.cancelled().await };
			match router.serve_with_incoming_shutdown(acceptor.into_incoming(), signal).await {
				Ok(()) => tracing::debug!(%addr, "listener.stopped"),
				Err(err) => tracing::warn!(%addr, error = %err, "listener.serve_failed"),
			}
		});
		*self.inner.server.lock() = Some(task);
		Ok(())
	}

	/// Opens a client connection through the pipe.
	///
	/// The underlying transport connects lazily on the first call.
	pub fn dial(&self) -> Result<Connection> {
		if self.is_closed() || self.inner.dialer.is_closed() {
			return Err(Error::ListenerClosed);
		}
		let endpoint = Endpoint::from(self.inner.config.endpoint_uri()?);
		let handle = self.inner.runtime.handle().clone();
		let channel = {
			let _enter = handle.enter();
			endpoint.connect_with_connector_lazy(MemoryConnector::new(self.inner.dialer.clone()))
		};
		tracing::debug!(addr = %self.inner.addr, "listener.dial");

		let engine = TonicEngine::new(channel, handle, self.inner.config.stream_capacity);
		Ok(Connection::new(engine, self.inner.bridge.clone(), self.inner.base.child()))
	}

	/// Stops accepting and cancels every call issued through the listener.
	/// Repeated calls are no-ops.
	pub fn close(&self) {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(mut acceptor) = self.inner.acceptor.lock().take() {
			acceptor.close();
		}
		self.inner.shutdown.cancel();
		self.inner.base.cancel();
		tracing::debug!(addr = %self.inner.addr, outstanding = self.scope().outstanding(), "listener.close");
	}

	/// Blocks until every outstanding operation has settled and, once closed,
	/// the server has stopped.
	///
	/// Must be called from a synchronous thread, never from async code or a
	/// bridged unit.
	pub fn wait(&self) {
		self.scope().drain();
		if !self.is_closed() {
			return;
		}
		let Some(server) = self.inner.server.lock().take() else {
			return;
		};

		let abort = server.abort_handle();
		match self.inner.runtime.handle().block_on(tokio::time::timeout(SHUTDOWN_GRACE, server)) {
			Ok(Ok(())) => {}
			Ok(Err(err)) => {
				if let Some(message) = join_error_panic_message(err) {
					tracing::warn!(addr = %self.inner.addr, panic = %message, "listener.server_panicked");
				}
			}
			Err(_) => {
				abort.abort();
				tracing::debug!(addr = %self.inner.addr, "listener.shutdown_forced");
			}
		}
	}

	/// Resolves once no operation is outstanding.
	pub async fn drained(&self) {
		self.scope().drained().await;
	}
}

impl fmt::Debug for Listener {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener")
			.field("addr", &self.inner.addr)
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
