//! Wire messages of `echo.EchoService`.

/// Fully qualified service name.
pub const SERVICE_NAME: &str = "echo.EchoService";

/// Unary: one request, one response.
pub const ONCE: &str = "/echo.EchoService/Once";
/// Server streaming: one request, `repeat` responses.
pub const MANY: &str = "/echo.EchoService/Many";
/// Client streaming: many requests, one batch response.
pub const BUFF: &str = "/echo.EchoService/Buff";
/// Bidirectional: responses to each request as it arrives.
pub const LIVE: &str = "/echo.EchoService/Live";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoRequest {
	#[prost(string, tag = "1")]
	pub message: ::prost::alloc::string::String,
	/// Number of responses per request; zero means one.
	#[prost(uint32, tag = "2")]
	pub repeat: u32,
	/// Characters to rotate right before each response, applied cumulatively.
	#[prost(int32, tag = "3")]
	pub circular_shift: i32,
	/// Status to fail with instead of answering. An OK code is ignored.
	#[prost(message, optional, tag = "4")]
	pub status: ::core::option::Option<EchoStatus>,
	/// Never answer; wait for the caller to give up.
	#[prost(bool, tag = "5")]
	pub over_void: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoStatus {
	#[prost(int32, tag = "1")]
	pub code: i32,
	#[prost(string, tag = "2")]
	pub message: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoResponse {
	#[prost(string, tag = "1")]
	pub message: ::prost::alloc::string::String,
	/// Position of this response within the call, starting at zero.
	#[prost(uint32, tag = "2")]
	pub sequence: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EchoBatchResponse {
	#[prost(message, repeated, tag = "1")]
	pub items: ::prost::alloc::vec::Vec<EchoResponse>,
}
