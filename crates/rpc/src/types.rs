use std::fmt;
use std::str::FromStr;

use bufnet_metadata::Metadata;
use bytes::Bytes;

use crate::status::RpcStatus;
use crate::{Error, Result};

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
	/// Metadata sent with the call. Empty metadata sends nothing.
	pub metadata: Metadata,
}

impl CallOptions {
	/// Options carrying `metadata`.
	pub fn with_metadata(metadata: Metadata) -> Self {
		Self { metadata }
	}
}

/// Shape of a streaming call, fixed per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
	/// Many requests, one response.
	Client,
	/// One request, many responses.
	Server,
	/// Many requests, many responses.
	Bidi,
}

impl StreamKind {
	/// Lowercase name, as accepted by [`FromStr`].
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Client => "client",
			Self::Server => "server",
			Self::Bidi => "bidi",
		}
	}
}

impl fmt::Display for StreamKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for StreamKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"client" => Ok(Self::Client),
			"server" => Ok(Self::Server),
			"bidi" => Ok(Self::Bidi),
			other => Err(Error::Argument(format!("unknown stream kind {other:?}"))),
		}
	}
}

/// Settled outcome of a unary (or client-streaming) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcResult {
	/// Leading metadata sent by the responder.
	pub header: Metadata,
	/// Trailing metadata sent by the responder.
	pub trailer: Metadata,
	/// Response message; empty unless `status` is OK.
	pub response: Bytes,
	/// Final status.
	pub status: RpcStatus,
}

/// Result of one `recv` on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
	/// An inbound message.
	Message(Bytes),
	/// The stream is over. Every later `recv` returns the same record.
	End(StreamEnd),
}

impl StreamItem {
	/// Returns true for [`StreamItem::End`].
	pub fn is_end(&self) -> bool {
		matches!(self, Self::End(_))
	}
}

/// Terminal record of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEnd {
	/// Trailing metadata; empty if the stream was cancelled locally.
	pub trailer: Metadata,
	/// Final status.
	pub status: RpcStatus,
}

impl StreamEnd {
	pub(crate) fn cancelled() -> Self {
		Self {
			trailer: Metadata::new(),
			status: RpcStatus::cancelled(),
		}
	}
}

/// Checks that `method` has the `/package.Service/Method` form.
pub(crate) fn validate_method(method: &str) -> Result<()> {
	let valid = method
		.strip_prefix('/')
		.and_then(|rest| rest.split_once('/'))
		.is_some_and(|(service, name)| !service.is_empty() && !name.is_empty() && !name.contains('/'));
	if valid {
		Ok(())
	} else {
		Err(Error::Argument(format!("malformed method name {method:?}")))
	}
}
