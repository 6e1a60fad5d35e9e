//! In-memory stand-in for a network listener.
//!
//! Every dial creates a bounded duplex byte pipe and hands its server half to
//! the [`Acceptor`] through a bounded backlog queue. Writers block once the
//! pipe's buffer is full.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::transport::Uri;
use tonic::transport::server::Connected;
use tower_service::Service;

/// Address of an in-memory listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Addr {
	authority: Arc<str>,
}

impl Addr {
	/// Creates an address for `authority`.
	pub fn new(authority: &str) -> Self {
		Self {
			authority: authority.into(),
		}
	}

	/// Network name, always `"bufnet"`.
	pub fn network(&self) -> &'static str {
		"bufnet"
	}

	/// The stand-in authority.
	pub fn authority(&self) -> &str {
		&self.authority
	}
}

impl fmt::Display for Addr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.authority)
	}
}

pin_project! {
	/// One end of an in-memory connection.
	#[derive(Debug)]
	pub struct MemoryConn {
		#[pin]
		io: DuplexStream,
		addr: Addr,
	}
}

impl MemoryConn {
	/// Address of the listener this connection belongs to.
	pub fn addr(&self) -> &Addr {
		&self.addr
	}
}

impl AsyncRead for MemoryConn {
	fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		self.project().io.poll_read(cx, buf)
	}
}

impl AsyncWrite for MemoryConn {
	fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
		self.project().io.poll_write(cx, buf)
	}

	fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.project().io.poll_flush(cx)
	}

	fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		self.project().io.poll_shutdown(cx)
	}
}

impl Connected for MemoryConn {
	type ConnectInfo = Addr;

	fn connect_info(&self) -> Self::ConnectInfo {
		self.addr.clone()
	}
}

/// Creates a connected dialer/acceptor pair.
///
/// `buffer_size` bounds each direction of every connection; `backlog` bounds
/// dials waiting to be accepted.
pub fn pipe(addr: Addr, buffer_size: usize, backlog: usize) -> (Dialer, Acceptor) {
	let (tx, rx) = mpsc::channel(backlog.max(1));
	let dialer = Dialer {
		tx,
		addr,
		buffer_size: buffer_size.max(1),
	};
	(dialer, Acceptor { rx })
}

/// Client side of [`pipe`].
#[derive(Debug, Clone)]
pub struct Dialer {
	tx: mpsc::Sender<MemoryConn>,
	addr: Addr,
	buffer_size: usize,
}

impl Dialer {
	/// Opens a connection, waiting while the accept backlog is full.
	///
	/// Fails with [`io::ErrorKind::ConnectionRefused`] once the acceptor is gone.
	pub async fn dial(&self) -> io::Result<MemoryConn> {
		let (client, server) = tokio::io::duplex(self.buffer_size);
		let server = MemoryConn {
			io: server,
			addr: self.addr.clone(),
		};
		self.tx
			.send(server)
			.await
			.map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener is closed"))?;
		tracing::trace!(addr = %self.addr, "transport.dial");
		Ok(MemoryConn {
			io: client,
			addr: self.addr.clone(),
		})
	}

	/// Returns true once the acceptor has been dropped or closed.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Server side of [`pipe`].
#[derive(Debug)]
pub struct Acceptor {
	rx: mpsc::Receiver<MemoryConn>,
}

impl Acceptor {
	/// Waits for the next dial. Returns `None` once every dialer is gone.
	pub async fn accept(&mut self) -> Option<MemoryConn> {
		self.rx.recv().await
	}

	/// Refuses further dials; already queued ones can still be accepted.
	pub fn close(&mut self) {
		self.rx.close();
	}

	/// Adapts the acceptor into the incoming-connection stream tonic serves.
	pub fn into_incoming(self) -> impl Stream<Item = io::Result<MemoryConn>> + Send + 'static {
		ReceiverStream::new(self.rx).map(Ok)
	}
}

/// Connector handing tonic's client fresh in-memory connections.
#[derive(Debug, Clone)]
pub(crate) struct MemoryConnector {
	dialer: Dialer,
}

impl MemoryConnector {
	pub(crate) fn new(dialer: Dialer) -> Self {
		Self { dialer }
	}
}

impl Service<Uri> for MemoryConnector {
	type Response = MemoryConn;
	type Error = io::Error;
	type Future = Pin<Box<dyn Future<Output = io::Result<MemoryConn>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, _uri: Uri) -> Self::Future {
		let dialer = self.dialer.clone();
		Box::pin(async move { dialer.dial().await })
	}
}
