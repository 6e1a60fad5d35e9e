//! Byte-transparent gRPC codec.

use bytes::{Buf, BufMut, Bytes};
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};

/// Moves already-serialized messages through tonic untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
	type Encode = Bytes;
	type Decode = Bytes;
	type Encoder = PassThroughCodec;
	type Decoder = PassThroughCodec;

	fn encoder(&mut self) -> Self::Encoder {
		PassThroughCodec
	}

	fn decoder(&mut self) -> Self::Decoder {
		PassThroughCodec
	}
}

impl Encoder for PassThroughCodec {
	type Item = Bytes;
	type Error = Status;

	fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
		dst.put_slice(&item);
		Ok(())
	}
}

impl Decoder for PassThroughCodec {
	type Item = Bytes;
	type Error = Status;

	fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
		let len = src.remaining();
		Ok(Some(src.copy_to_bytes(len)))
	}
}
