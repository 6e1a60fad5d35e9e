//! Conversions between [`Metadata`] and tonic's [`MetadataMap`].

use bufnet_metadata::Metadata;
use tonic::metadata::{AsciiMetadataValue, BinaryMetadataValue, KeyAndValueRef, MetadataKey, MetadataMap};

use crate::engine::EngineError;

/// Headers owned by the transport rather than the caller.
fn is_reserved(key: &str) -> bool {
	matches!(key, "content-type" | "te" | "user-agent" | "date") || key.starts_with("grpc-")
}

/// Converts received headers or trailers, dropping transport headers.
///
/// Binary (`-bin`) values are decoded; values that are not UTF-8 are skipped.
pub(crate) fn from_metadata_map(map: &MetadataMap) -> Metadata {
	let mut metadata = Metadata::new();
	for entry in map.iter() {
		match entry {
			KeyAndValueRef::Ascii(key, value) if !is_reserved(key.as_str()) => {
				if let Ok(text) = value.to_str() {
					metadata.append(key.as_str(), text);
				}
			}
			KeyAndValueRef::Binary(key, value) if !is_reserved(key.as_str()) => {
				if let Some(text) = value.to_bytes().ok().and_then(|raw| String::from_utf8(raw.to_vec()).ok()) {
					metadata.append(key.as_str(), text);
				}
			}
			_ => {}
		}
	}
	metadata
}

/// Builds outgoing request metadata.
///
/// Values of keys ending in `-bin` are base64-encoded on the wire.
pub(crate) fn to_metadata_map(metadata: &Metadata) -> Result<MetadataMap, EngineError> {
	let mut map = MetadataMap::new();
	for (key, values) in metadata {
		if is_reserved(key) {
			return Err(EngineError::Invalid(format!("metadata key {key:?} is reserved")));
		}
		for value in values {
			if key.ends_with("-bin") {
				let key = MetadataKey::from_bytes(key.as_bytes()).map_err(|err| invalid_key(key, err))?;
				map.append_bin(key, BinaryMetadataValue::from_bytes(value.as_bytes()));
			} else {
				let key = MetadataKey::from_bytes(key.as_bytes()).map_err(|err| invalid_key(key, err))?;
				let value = AsciiMetadataValue::try_from(value.as_str())
					.map_err(|_| EngineError::Invalid(format!("metadata value of {key:?} is not printable ASCII")))?;
				map.append(key, value);
			}
		}
	}
	Ok(map)
}

fn invalid_key(key: &str, err: impl std::fmt::Display) -> EngineError {
	EngineError::Invalid(format!("metadata key {key:?} is invalid: {err}"))
}
