use bufnet_metadata::MetadataError;
use bufnet_worker::UnitFailure;

use crate::engine::EngineError;
use crate::status::RpcStatus;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Future returned by every bridged operation.
pub type Pending<T> = bufnet_worker::Pending<T, Error>;

/// Possible errors.
///
/// Structured RPC statuses normally travel as data inside results; only
/// operations the engine refuses outright reject with [`Error::Status`].
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// A caller-supplied argument is malformed.
	#[error("invalid argument: {0}")]
	Argument(String),
	/// Caller-supplied metadata is malformed.
	#[error("invalid metadata: {0}")]
	Metadata(#[from] MetadataError),
	/// The engine refused the operation with a status.
	#[error("{0}")]
	Status(RpcStatus),
	/// The transport failed without producing a status.
	#[error("transport error: {0}")]
	Transport(String),
	/// The bridged unit itself failed.
	#[error("{0}")]
	Unit(#[from] UnitFailure),
	/// The connection was closed before the call was issued.
	#[error("connection is closed")]
	ConnectionClosed,
	/// The stream was closed locally.
	#[error("stream is closed")]
	StreamClosed,
	/// The listener no longer accepts connections.
	#[error("listener is closed")]
	ListenerClosed,
	/// Configuration could not be loaded or is out of range.
	#[error("invalid configuration: {0}")]
	Config(String),
}

impl From<EngineError> for Error {
	fn from(err: EngineError) -> Self {
		match err {
			EngineError::Status(status) => Self::Status(status),
			EngineError::Transport(reason) => Self::Transport(reason),
			EngineError::Invalid(reason) => Self::Argument(reason),
		}
	}
}
