//! Shared harness: a listener serving the echo service and one dialed connection.

#![allow(dead_code)]

use bufnet_echo::EchoServer;
use bufnet_echo::proto::{EchoBatchResponse, EchoRequest, EchoResponse, EchoStatus};
use bufnet_rpc::{BridgeConfig, Connection, Listener, Metadata};
use bytes::Bytes;
use prost::Message;
use tonic::Code;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub struct Harness {
	pub listener: Listener,
	pub conn: Connection,
}

impl Harness {
	pub fn start() -> Self {
		Self::with_config(BridgeConfig::default())
	}

	pub fn with_config(config: BridgeConfig) -> Self {
		init_tracing();
		let listener = Listener::bind(config).unwrap();
		listener.serve(Server::builder().add_service(EchoServer)).unwrap();
		let conn = listener.dial().unwrap();
		Self { listener, conn }
	}
}

pub fn request(message: &str) -> EchoRequest {
	EchoRequest {
		message: message.to_string(),
		..EchoRequest::default()
	}
}

pub fn failing(code: Code, message: &str) -> EchoRequest {
	EchoRequest {
		status: Some(EchoStatus {
			code: code as i32,
			message: message.to_string(),
		}),
		..EchoRequest::default()
	}
}

pub fn over_void() -> EchoRequest {
	EchoRequest {
		over_void: true,
		..EchoRequest::default()
	}
}

pub fn encode(request: &EchoRequest) -> Bytes {
	Bytes::from(request.encode_to_vec())
}

pub fn decode(response: &[u8]) -> EchoResponse {
	EchoResponse::decode(response).unwrap()
}

pub fn decode_batch(response: &[u8]) -> EchoBatchResponse {
	EchoBatchResponse::decode(response).unwrap()
}

pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
	pairs.iter().map(|(key, value)| (*key, *value)).collect()
}
