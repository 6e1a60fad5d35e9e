/// Execution classes for bridged units, used for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// A unary call.
	Call,
	/// Opening a streaming call.
	StreamOpen,
	/// One operation on an open stream (header, send, recv, close_send).
	Stream,
	/// Lifecycle work: closing connections, dialing, draining.
	Control,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Call => "call",
			Self::StreamOpen => "stream_open",
			Self::Stream => "stream",
			Self::Control => "control",
		}
	}
}
