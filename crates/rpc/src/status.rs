use std::fmt;

use tonic::Code;

/// Outcome of an RPC as reported by the responder or the local runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcStatus {
	/// Canonical gRPC status code.
	pub code: Code,
	/// Human-readable detail; empty on success.
	pub message: String,
}

impl RpcStatus {
	/// Creates a status.
	pub fn new(code: Code, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	/// The success status.
	pub fn ok() -> Self {
		Self::new(Code::Ok, "")
	}

	/// The status observed by calls cancelled on the local side.
	pub fn cancelled() -> Self {
		Self::new(Code::Cancelled, "context canceled")
	}

	/// A call that should have produced exactly one response produced none.
	pub(crate) fn missing_response() -> Self {
		Self::new(
			Code::Internal,
			"cardinality violation: expected <Response> for non server-streaming RPCs, but received <EOF>",
		)
	}

	/// A call that should have produced exactly one response produced more.
	pub(crate) fn extra_response() -> Self {
		Self::new(
			Code::Internal,
			"cardinality violation: expected <EOF> for non server-streaming RPCs, but received another message",
		)
	}

	/// Returns true for [`Code::Ok`].
	pub fn is_ok(&self) -> bool {
		self.code == Code::Ok
	}

	/// Numeric wire value of the code.
	pub fn code_value(&self) -> i32 {
		i32::from(self.code)
	}
}

impl Default for RpcStatus {
	fn default() -> Self {
		Self::ok()
	}
}

impl From<&tonic::Status> for RpcStatus {
	fn from(status: &tonic::Status) -> Self {
		Self::new(status.code(), status.message())
	}
}

impl fmt::Display for RpcStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "rpc error: code = {:?} desc = {}", self.code, self.message)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancelled_matches_context_cancellation() {
		let status = RpcStatus::cancelled();
		assert_eq!(status.code_value(), 1);
		assert_eq!(status.message, "context canceled");
		assert_eq!(status.to_string(), "rpc error: code = Cancelled desc = context canceled");
	}

	#[test]
	fn converts_from_tonic() {
		let status = RpcStatus::from(&tonic::Status::not_found("gone"));
		assert_eq!(status, RpcStatus::new(Code::NotFound, "gone"));
		assert!(!status.is_ok());
		assert!(RpcStatus::default().is_ok());
	}
}
