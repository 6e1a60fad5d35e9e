//! Adapter for hosts that exchange plain JSON values.
//!
//! Arguments arrive as positional [`Value`] lists and results leave as JSON
//! objects; byte payloads are arrays of numbers and metadata uses the
//! [`bufnet_metadata::to_host`] shape. Malformed arguments reject through an
//! already-settled future and never reach the engine.

use std::future::Future;
use std::sync::OnceLock;

use bufnet_metadata::{Metadata, MetadataError, from_host, to_host};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::listener::Listener;
use crate::status::RpcStatus;
use crate::stream::StreamSession;
use crate::types::{CallOptions, RpcResult, StreamItem, StreamKind};
use crate::{Connection, Error, Pending, Result};

static INSTALLED: OnceLock<Listener> = OnceLock::new();

/// Publishes `listener` for hosts that discover it by name. Succeeds once per
/// process.
pub fn install(listener: Listener) -> Result<()> {
	let addr = listener.addr().clone();
	INSTALLED
		.set(listener)
		.map_err(|_| Error::Argument("a listener is already installed".into()))?;
	tracing::debug!(%addr, "host.install");
	Ok(())
}

/// The listener published by [`install`], if any.
pub fn installed() -> Option<Listener> {
	INSTALLED.get().cloned()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HostOptions {
	meta: Value,
}

fn options(value: Option<&Value>) -> Result<CallOptions> {
	let options: HostOptions = match value {
		None | Some(Value::Null) => return Ok(CallOptions::default()),
		Some(value) => {
			HostOptions::deserialize(value).map_err(|err| Error::Argument(format!("options must be an object: {err}")))?
		}
	};
	let metadata = match options.meta {
		Value::Null => Metadata::new(),
		Value::String(text) => {
			let value: Value = serde_json::from_str(&text).map_err(|err| MetadataError::Json(err.to_string()))?;
			from_host(&value)?
		}
		other => from_host(&other)?,
	};
	Ok(CallOptions::with_metadata(metadata))
}

fn bytes(value: &Value, what: &str) -> Result<Bytes> {
	Vec::<u8>::deserialize(value)
		.map(Bytes::from)
		.map_err(|err| Error::Argument(format!("{what} must be a byte array: {err}")))
}

fn string<'a>(value: &'a Value, what: &str) -> Result<&'a str> {
	value
		.as_str()
		.ok_or_else(|| Error::Argument(format!("{what} must be a string")))
}

fn arity(args: &[Value], expected: usize) -> Result<()> {
	if args.len() == expected {
		Ok(())
	} else {
		Err(Error::Argument(format!("expected {expected} arguments, got {}", args.len())))
	}
}

fn status_to_host(status: &RpcStatus) -> Value {
	json!({ "code": status.code_value(), "message": status.message })
}

fn result_to_host(result: &RpcResult) -> Value {
	json!({
		"header": to_host(&result.header),
		"trailer": to_host(&result.trailer),
		"response": result.response.to_vec(),
		"status": status_to_host(&result.status),
	})
}

fn item_to_host(item: &StreamItem) -> Value {
	match item {
		StreamItem::Message(response) => json!({ "done": false, "response": response.to_vec() }),
		StreamItem::End(end) => json!({
			"done": true,
			"trailer": to_host(&end.trailer),
			"status": status_to_host(&end.status),
		}),
	}
}

fn settle<T, F>(pending: Pending<T>, convert: F) -> impl Future<Output = Result<Value>> + Send + 'static
where
	T: Send + 'static,
	F: FnOnce(T) -> Value + Send + 'static,
{
	async move { pending.await.map(convert) }
}

fn unit(_: ()) -> Value {
	Value::Null
}

/// Host-facing wrapper around a [`Connection`].
#[derive(Debug, Clone)]
pub struct HostConnection {
	conn: Connection,
}

impl HostConnection {
	/// Dials `listener`.
	pub fn dial(listener: &Listener) -> Result<Self> {
		Ok(Self { conn: listener.dial()? })
	}

	/// Dials the installed listener.
	pub fn dial_installed() -> Result<Self> {
		let listener = installed().ok_or_else(|| Error::Argument("no listener is installed".into()))?;
		Self::dial(&listener)
	}

	/// The wrapped connection.
	pub fn connection(&self) -> &Connection {
		&self.conn
	}

	/// Unary call taking `[method, request, options]`.
	///
	/// Resolves to `{ header, trailer, response, status: { code, message } }`.
	pub fn invoke(&self, args: &[Value]) -> impl Future<Output = Result<Value>> + Send + 'static {
		let pending = match parse_invoke(args) {
			Ok((method, request, options)) => self.conn.invoke(method, request, options),
			Err(err) => Pending::ready(Err(err)),
		};
		settle(pending, |result| result_to_host(&result))
	}

	/// Opens a stream of `kind` (`"client"`, `"server"` or `"bidi"`) taking
	/// `[method, options]`.
	pub fn open_stream(&self, kind: &str, args: &[Value]) -> impl Future<Output = Result<HostStream>> + Send + 'static {
		let pending = match parse_open(kind, args) {
			Ok((kind, method, options)) => self.conn.open_stream(kind, method, options),
			Err(err) => Pending::ready(Err(err)),
		};
		async move { pending.await.map(|session| HostStream { session }) }
	}

	/// Closes the connection; resolves to `null`.
	pub fn close(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.conn.close(), unit)
	}
}

fn parse_invoke(args: &[Value]) -> Result<(&str, Bytes, CallOptions)> {
	arity(args, 3)?;
	let method = string(&args[0], "method")?;
	let request = bytes(&args[1], "request")?;
	Ok((method, request, options(args.get(2))?))
}

fn parse_open<'a>(kind: &str, args: &'a [Value]) -> Result<(StreamKind, &'a str, CallOptions)> {
	let kind = kind.parse::<StreamKind>()?;
	arity(args, 2)?;
	let method = string(&args[0], "method")?;
	Ok((kind, method, options(args.get(1))?))
}

/// Host-facing wrapper around a [`StreamSession`].
#[derive(Debug)]
pub struct HostStream {
	session: StreamSession,
}

impl HostStream {
	/// The wrapped session.
	pub fn session(&self) -> &StreamSession {
		&self.session
	}

	/// Resolves to the header metadata.
	pub fn header(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.session.header(), |header| to_host(&header))
	}

	/// Sends `[message]`; resolves to `null`.
	pub fn send(&self, args: &[Value]) -> impl Future<Output = Result<Value>> + Send + 'static {
		let pending = match arity(args, 1).and_then(|()| bytes(&args[0], "message")) {
			Ok(message) => self.session.send(message),
			Err(err) => Pending::ready(Err(err)),
		};
		settle(pending, unit)
	}

	/// Half-closes; resolves to `null`.
	pub fn close_send(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.session.close_send(), unit)
	}

	/// Resolves to `{ done: false, response }` or
	/// `{ done: true, trailer, status: { code, message } }`.
	pub fn recv(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.session.recv(), |item| item_to_host(&item))
	}

	/// Cancels the stream; resolves to `null`.
	pub fn close(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.session.close(), unit)
	}

	/// Client-streaming completion; resolves like [`HostConnection::invoke`].
	pub fn close_and_recv(&self) -> impl Future<Output = Result<Value>> + Send + 'static {
		settle(self.session.close_and_recv(), |result| result_to_host(&result))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn options_accept_objects_and_json_strings() {
		let object = json!({ "meta": { "a": ["1", "2"] } });
		let text = json!({ "meta": "{\"a\":[\"1\",\"2\"]}" });
		let expected = options(Some(&object)).unwrap();
		assert_eq!(expected.metadata.get_all("a"), ["1", "2"]);
		assert_eq!(options(Some(&text)).unwrap(), expected);
	}

	#[test]
	fn missing_options_mean_defaults() {
		assert_eq!(options(None).unwrap(), CallOptions::default());
		assert_eq!(options(Some(&Value::Null)).unwrap(), CallOptions::default());
		assert_eq!(options(Some(&json!({}))).unwrap(), CallOptions::default());
	}

	#[test]
	fn malformed_metadata_is_rejected() {
		assert!(matches!(
			options(Some(&json!({ "meta": { "a": "not a list" } }))),
			Err(Error::Metadata(MetadataError::NotAList { .. }))
		));
		assert!(matches!(
			options(Some(&json!({ "meta": "{" }))),
			Err(Error::Metadata(MetadataError::Json(_)))
		));
		assert!(matches!(options(Some(&json!(7))), Err(Error::Argument(_))));
	}

	#[test]
	fn byte_arrays_must_hold_octets() {
		assert_eq!(bytes(&json!([1, 2, 255]), "request").unwrap(), Bytes::from_static(&[1, 2, 255]));
		assert!(bytes(&json!([256]), "request").is_err());
		assert!(bytes(&json!("abc"), "request").is_err());
	}

	#[test]
	fn invoke_arguments_are_positional() {
		let args = [json!("/echo.EchoService/Once"), json!([]), Value::Null];
		let (method, request, _) = parse_invoke(&args).unwrap();
		assert_eq!(method, "/echo.EchoService/Once");
		assert!(request.is_empty());
		assert!(parse_invoke(&args[..2]).is_err());
		assert!(parse_invoke(&[json!(1), json!([]), Value::Null]).is_err());
	}

	#[test]
	fn stream_items_have_host_shape() {
		let message = item_to_host(&StreamItem::Message(Bytes::from_static(b"hi")));
		assert_eq!(message, json!({ "done": false, "response": [104, 105] }));

		let end = item_to_host(&StreamItem::End(Default::default()));
		assert_eq!(end, json!({ "done": true, "trailer": {}, "status": { "code": 0, "message": "" } }));
	}
}
