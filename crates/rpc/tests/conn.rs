mod common;

use std::time::Duration;

use bufnet_echo::proto::{EchoRequest, ONCE};
use bufnet_rpc::{CallOptions, Error, RpcStatus};
use common::{Harness, decode, encode, failing, metadata, over_void, request};
use pretty_assertions::assert_eq;
use tonic::Code;

#[tokio::test]
async fn invoke_returns_the_shifted_echo() {
	let h = Harness::start();
	let req = EchoRequest {
		circular_shift: 3,
		..request("Lebowski")
	};

	let result = h.conn.invoke(ONCE, encode(&req), CallOptions::default()).await.unwrap();

	assert_eq!(result.status, RpcStatus::ok());
	let reply = decode(&result.response);
	assert_eq!(reply.message, "skiLebow");
	assert_eq!(reply.sequence, 0);
}

#[tokio::test]
async fn invoke_echoes_metadata_as_header_and_trailer() {
	let h = Harness::start();
	let options = CallOptions::with_metadata(metadata(&[("dude", "abides"), ("dude", "bowls")]));

	let result = h.conn.invoke(ONCE, encode(&request("rug")), options).await.unwrap();

	assert!(result.status.is_ok());
	assert_eq!(result.header.get_all("dude"), ["abides", "bowls"]);
	assert_eq!(result.header.get("timing"), Some("header"));
	assert_eq!(result.trailer.get_all("dude"), ["abides", "bowls"]);
	assert_eq!(result.trailer.get("timing"), Some("trailer"));
}

#[tokio::test]
async fn failed_status_resolves_as_data() {
	let h = Harness::start();
	let options = CallOptions::with_metadata(metadata(&[("walter", "sobchak")]));

	let result = h
		.conn
		.invoke(ONCE, encode(&failing(Code::NotFound, "no rug")), options)
		.await
		.unwrap();

	assert_eq!(result.status, RpcStatus::new(Code::NotFound, "no rug"));
	assert!(result.response.is_empty());
	assert_eq!(result.header.get("timing"), Some("header"));
	assert_eq!(result.trailer.get("walter"), Some("sobchak"));
	assert_eq!(result.trailer.get("timing"), Some("trailer"));
}

#[tokio::test]
async fn ok_code_in_request_status_is_ignored() {
	let h = Harness::start();
	let req = EchoRequest {
		message: "abide".into(),
		..failing(Code::Ok, "ignored")
	};

	let result = h.conn.invoke(ONCE, encode(&req), CallOptions::default()).await.unwrap();

	assert!(result.status.is_ok());
	assert_eq!(decode(&result.response).message, "abide");
}

#[tokio::test]
async fn unknown_method_is_unimplemented() {
	let h = Harness::start();

	let result = h
		.conn
		.invoke("/echo.EchoService/Nope", encode(&request("x")), CallOptions::default())
		.await
		.unwrap();

	assert_eq!(result.status.code, Code::Unimplemented);
	assert!(result.response.is_empty());
}

#[tokio::test]
async fn closing_the_connection_cancels_hanging_calls() {
	let h = Harness::start();
	let pending = h.conn.invoke(ONCE, encode(&over_void()), CallOptions::default());
	tokio::time::sleep(Duration::from_millis(50)).await;

	h.conn.close().await.unwrap();
	let result = tokio::time::timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();

	assert_eq!(result.status, RpcStatus::cancelled());
	assert_eq!(result.status.message, "context canceled");
	assert!(result.response.is_empty());
}

#[tokio::test]
async fn closed_connection_rejects_new_calls() {
	let h = Harness::start();
	h.conn.close().await.unwrap();
	h.conn.close().await.unwrap();
	assert!(h.conn.is_closed());

	let err = h.conn.invoke(ONCE, encode(&request("x")), CallOptions::default()).await.unwrap_err();
	assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn malformed_method_is_an_argument_error() {
	let h = Harness::start();

	let err = h.conn.invoke("Once", encode(&request("x")), CallOptions::default()).await.unwrap_err();
	assert!(matches!(err, Error::Argument(_)));
}

#[tokio::test]
async fn reserved_metadata_keys_are_rejected() {
	let h = Harness::start();
	let options = CallOptions::with_metadata(metadata(&[("grpc-timeout", "1S")]));

	let err = h.conn.invoke(ONCE, encode(&request("x")), options).await.unwrap_err();
	assert!(matches!(err, Error::Argument(_)));
}

#[tokio::test]
async fn concurrent_calls_settle_independently() {
	let h = Harness::start();
	let pending: Vec<_> = (0..16)
		.map(|i| {
			let req = request(&format!("call-{i}"));
			h.conn.invoke(ONCE, encode(&req), CallOptions::default())
		})
		.collect();

	for (i, call) in pending.into_iter().enumerate() {
		let result = call.await.unwrap();
		assert_eq!(decode(&result.response).message, format!("call-{i}"));
	}
}

#[tokio::test]
async fn connections_close_independently() {
	let h = Harness::start();
	let other = h.listener.dial().unwrap();
	other.close().await.unwrap();

	let result = h.conn.invoke(ONCE, encode(&request("still here")), CallOptions::default()).await.unwrap();
	assert!(result.status.is_ok());
}
