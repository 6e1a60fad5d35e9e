use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::{Body, BoxFuture, Service, StdError, http};
use tonic::metadata::{KeyAndValueRef, MetadataMap, MetadataValue};
use tonic::server::{Grpc, NamedService, ServerStreamingService, StreamingService};
use tonic::{Code, Request, Response, Status};

use crate::proto::{BUFF, EchoBatchResponse, EchoRequest, EchoResponse, LIVE, MANY, ONCE, SERVICE_NAME};

/// Responses buffered ahead of a slow reader.
const RESPONSE_BUFFER: usize = 4;

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// Rotates `text` right by `shift` characters; negative shifts rotate left.
pub fn circular_shift(text: &str, shift: i32) -> String {
	let chars: Vec<char> = text.chars().collect();
	if chars.is_empty() {
		return String::new();
	}
	let split = i64::from(shift).wrapping_neg().rem_euclid(chars.len() as i64) as usize;
	chars[split..].iter().chain(&chars[..split]).collect()
}

fn is_reserved(key: &str) -> bool {
	matches!(key, "content-type" | "te" | "user-agent") || key.starts_with("grpc-")
}

/// Caller metadata minus transport headers, tagged with `timing`.
fn echoed(caller: &MetadataMap, timing: &'static str) -> MetadataMap {
	let mut md = MetadataMap::new();
	for entry in caller.iter() {
		match entry {
			KeyAndValueRef::Ascii(key, value) if !is_reserved(key.as_str()) => {
				md.append(key.clone(), value.clone());
			}
			KeyAndValueRef::Binary(key, value) if !is_reserved(key.as_str()) => {
				md.append_bin(key.clone(), value.clone());
			}
			_ => {}
		}
	}
	md.insert("timing", MetadataValue::from_static(timing));
	md
}

/// Terminal status that ends a response stream successfully with `trailer`.
fn finished(trailer: MetadataMap) -> Status {
	Status::with_metadata(Code::Ok, "", trailer)
}

fn requested_status(req: &EchoRequest, trailer: &MetadataMap) -> Option<Status> {
	req.status
		.as_ref()
		.filter(|status| status.code != Code::Ok as i32)
		.map(|status| Status::with_metadata(Code::from_i32(status.code), status.message.clone(), trailer.clone()))
}

/// Answers one request, continuing the call's sequence numbering.
fn expand(sequence: &mut u32, req: &EchoRequest, trailer: &MetadataMap) -> Result<Vec<EchoResponse>, Status> {
	if let Some(status) = requested_status(req, trailer) {
		return Err(status);
	}
	let mut message = req.message.clone();
	let replies = (0..req.repeat.max(1))
		.map(|_| {
			message = circular_shift(&message, req.circular_shift);
			let reply = EchoResponse {
				message: message.clone(),
				sequence: *sequence,
			};
			*sequence = sequence.wrapping_add(1);
			reply
		})
		.collect();
	Ok(replies)
}

fn with_header<T>(stream: ResponseStream<T>, header: MetadataMap) -> Response<ResponseStream<T>> {
	let mut response = Response::new(stream);
	*response.metadata_mut() = header;
	response
}

fn once(request: Request<EchoRequest>) -> Response<ResponseStream<EchoResponse>> {
	let header = echoed(request.metadata(), "header");
	let trailer = echoed(request.metadata(), "trailer");
	let req = request.into_inner();

	let stream: ResponseStream<EchoResponse> = if let Some(status) = requested_status(&req, &trailer) {
		Box::pin(tokio_stream::once(Err(status)))
	} else if req.over_void {
		Box::pin(tokio_stream::pending())
	} else {
		let reply = EchoResponse {
			message: circular_shift(&req.message, req.circular_shift),
			sequence: 0,
		};
		Box::pin(tokio_stream::iter([Ok(reply), Err(finished(trailer))]))
	};
	with_header(stream, header)
}

fn many(request: Request<EchoRequest>) -> Response<ResponseStream<EchoResponse>> {
	let req = request.into_inner();
	let stream: ResponseStream<EchoResponse> = if req.over_void {
		Box::pin(tokio_stream::pending())
	} else {
		let items = match expand(&mut 0, &req, &MetadataMap::new()) {
			Ok(replies) => replies.into_iter().map(Ok).collect(),
			Err(status) => vec![Err(status)],
		};
		Box::pin(tokio_stream::iter(items))
	};
	Response::new(stream)
}

fn buff(request: Request<Streaming<EchoRequest>>) -> Response<ResponseStream<EchoBatchResponse>> {
	let mut inbound = request.into_inner();
	let (tx, rx) = mpsc::channel(1);
	tokio::spawn(async move {
		let mut sequence = 0;
		let mut items = Vec::new();
		let outcome = loop {
			match inbound.message().await {
				Ok(Some(req)) => match expand(&mut sequence, &req, &MetadataMap::new()) {
					Ok(replies) => items.extend(replies),
					Err(status) => break Err(status),
				},
				Ok(None) => break Ok(EchoBatchResponse { items }),
				Err(status) => break Err(status),
			}
		};
		let _ = tx.send(outcome).await;
	});
	Response::new(Box::pin(ReceiverStream::new(rx)))
}

fn live(request: Request<Streaming<EchoRequest>>) -> Response<ResponseStream<EchoResponse>> {
	let header = echoed(request.metadata(), "header");
	let trailer = echoed(request.metadata(), "trailer");
	let mut inbound = request.into_inner();
	let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

	tokio::spawn(async move {
		let mut sequence = 0;
		loop {
			let req = match inbound.message().await {
				Ok(Some(req)) => req,
				Ok(None) => {
					let _ = tx.send(Err(finished(trailer))).await;
					return;
				}
				Err(status) => {
					tracing::debug!(code = ?status.code(), "echo.live.inbound_failed");
					let _ = tx.send(Err(status)).await;
					return;
				}
			};
			match expand(&mut sequence, &req, &trailer) {
				Ok(replies) => {
					for reply in replies {
						if tx.send(Ok(reply)).await.is_err() {
							return;
						}
					}
				}
				Err(status) => {
					let _ = tx.send(Err(status)).await;
					return;
				}
			}
		}
	});
	with_header(Box::pin(ReceiverStream::new(rx)), header)
}

struct OnceSvc;

impl ServerStreamingService<EchoRequest> for OnceSvc {
	type Response = EchoResponse;
	type ResponseStream = ResponseStream<EchoResponse>;
	type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

	fn call(&mut self, request: Request<EchoRequest>) -> Self::Future {
		Box::pin(async move { Ok(once(request)) })
	}
}

struct ManySvc;

impl ServerStreamingService<EchoRequest> for ManySvc {
	type Response = EchoResponse;
	type ResponseStream = ResponseStream<EchoResponse>;
	type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

	fn call(&mut self, request: Request<EchoRequest>) -> Self::Future {
		Box::pin(async move { Ok(many(request)) })
	}
}

struct BuffSvc;

impl StreamingService<EchoRequest> for BuffSvc {
	type Response = EchoBatchResponse;
	type ResponseStream = ResponseStream<EchoBatchResponse>;
	type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

	fn call(&mut self, request: Request<Streaming<EchoRequest>>) -> Self::Future {
		Box::pin(async move { Ok(buff(request)) })
	}
}

struct LiveSvc;

impl StreamingService<EchoRequest> for LiveSvc {
	type Response = EchoResponse;
	type ResponseStream = ResponseStream<EchoResponse>;
	type Future = BoxFuture<Response<Self::ResponseStream>, Status>;

	fn call(&mut self, request: Request<Streaming<EchoRequest>>) -> Self::Future {
		Box::pin(async move { Ok(live(request)) })
	}
}

/// The `echo.EchoService` server.
///
/// Every method answers through a response stream, so that unary and
/// client-streaming calls can still attach trailers to a successful reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoServer;

impl<B> Service<http::Request<B>> for EchoServer
where
	B: Body + Send + 'static,
	B::Error: Into<StdError> + Send + 'static,
{
	type Response = http::Response<tonic::body::BoxBody>;
	type Error = Infallible;
	type Future = BoxFuture<Self::Response, Self::Error>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: http::Request<B>) -> Self::Future {
		let path = req.uri().path().to_string();
		tracing::trace!(method = %path, "echo.call");
		match path.as_str() {
			ONCE => Box::pin(async move { Ok(Grpc::new(ProstCodec::default()).server_streaming(OnceSvc, req).await) }),
			MANY => Box::pin(async move { Ok(Grpc::new(ProstCodec::default()).server_streaming(ManySvc, req).await) }),
			BUFF => Box::pin(async move { Ok(Grpc::new(ProstCodec::default()).streaming(BuffSvc, req).await) }),
			LIVE => Box::pin(async move { Ok(Grpc::new(ProstCodec::default()).streaming(LiveSvc, req).await) }),
			_ => {
				let response = Status::unimplemented(format!("unknown method {path}")).to_http();
				Box::pin(async move { Ok(response) })
			}
		}
	}
}

impl NamedService for EchoServer {
	const NAME: &'static str = SERVICE_NAME;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::proto::EchoStatus;

	#[test]
	fn shifts_right_by_characters() {
		assert_eq!(circular_shift("Lebowski", 3), "skiLebow");
		assert_eq!(circular_shift("Lebowski", -3), "owskiLeb");
		assert_eq!(circular_shift("Lebowski", 8), "Lebowski");
		assert_eq!(circular_shift("Lebowski", 11), "skiLebow");
		assert_eq!(circular_shift("", 5), "");
		assert_eq!(circular_shift("héllo", 1), "ohéll");
	}

	#[test]
	fn expand_applies_shift_cumulatively() {
		let req = EchoRequest {
			message: "abc".into(),
			repeat: 3,
			circular_shift: 1,
			..Default::default()
		};
		let mut sequence = 5;
		let replies = expand(&mut sequence, &req, &MetadataMap::new()).unwrap();
		let got: Vec<_> = replies.iter().map(|r| (r.message.as_str(), r.sequence)).collect();
		assert_eq!(got, [("cab", 5), ("bca", 6), ("abc", 7)]);
		assert_eq!(sequence, 8);
	}

	#[test]
	fn zero_repeat_answers_once() {
		let req = EchoRequest {
			message: "x".into(),
			..Default::default()
		};
		assert_eq!(expand(&mut 0, &req, &MetadataMap::new()).unwrap().len(), 1);
	}

	#[test]
	fn requested_status_carries_trailer() {
		let mut trailer = MetadataMap::new();
		trailer.insert("timing", MetadataValue::from_static("trailer"));
		let req = EchoRequest {
			status: Some(EchoStatus {
				code: Code::NotFound as i32,
				message: "nowhere".into(),
			}),
			..Default::default()
		};
		let status = expand(&mut 0, &req, &trailer).unwrap_err();
		assert_eq!(status.code(), Code::NotFound);
		assert_eq!(status.message(), "nowhere");
		assert_eq!(status.metadata().get("timing").unwrap(), "trailer");
	}

	#[test]
	fn ok_status_is_ignored() {
		let req = EchoRequest {
			message: "fine".into(),
			status: Some(EchoStatus {
				code: 0,
				message: "ignored".into(),
			}),
			..Default::default()
		};
		assert!(expand(&mut 0, &req, &MetadataMap::new()).is_ok());
	}

	#[test]
	fn echoed_metadata_drops_transport_headers() {
		let mut caller = MetadataMap::new();
		caller.insert("content-type", MetadataValue::from_static("application/grpc"));
		caller.insert("grpc-timeout", MetadataValue::from_static("1S"));
		caller.insert("x-name", MetadataValue::from_static("dude"));
		caller.insert("timing", MetadataValue::from_static("whenever"));

		let md = echoed(&caller, "header");
		assert_eq!(md.len(), 2);
		assert_eq!(md.get("x-name").unwrap(), "dude");
		assert_eq!(md.get("timing").unwrap(), "header");
	}
}
