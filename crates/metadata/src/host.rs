use serde_json::{Map, Value};

use crate::{Metadata, MetadataError};

/// Encodes metadata as `{ key: [value, ...] }`. Empty metadata encodes as `{}`.
pub fn to_host(metadata: &Metadata) -> Value {
	let object: Map<String, Value> = metadata
		.iter()
		.map(|(key, values)| {
			let list = values.iter().cloned().map(Value::String).collect();
			(key.to_string(), Value::Array(list))
		})
		.collect();
	Value::Object(object)
}

/// Decodes host metadata, failing on any unexpected shape.
///
/// `null` in place of a list is accepted and means no values.
pub fn from_host(value: &Value) -> Result<Metadata, MetadataError> {
	let Value::Object(object) = value else {
		return Err(MetadataError::NotAnObject { found: kind(value) });
	};

	let mut metadata = Metadata::new();
	for (key, entry) in object {
		match entry {
			Value::Null => {}
			Value::Array(items) => {
				for (index, item) in items.iter().enumerate() {
					let Value::String(text) = item else {
						return Err(MetadataError::NotAString { key: key.clone(), index });
					};
					metadata.append(key, text.as_str());
				}
			}
			other => {
				return Err(MetadataError::NotAList {
					key: key.clone(),
					found: kind(other),
				});
			}
		}
	}
	Ok(metadata)
}

/// Decodes host metadata, dropping whatever does not have the expected shape.
///
/// A non-object yields empty metadata; malformed entries and non-string list
/// elements are skipped. Meant for re-reading values produced by [`to_host`];
/// host input goes through [`from_host`].
pub fn from_host_lossy(value: &Value) -> Metadata {
	let Value::Object(object) = value else {
		return Metadata::new();
	};

	let mut metadata = Metadata::new();
	for (key, entry) in object {
		let Value::Array(items) = entry else {
			continue;
		};
		for text in items.iter().filter_map(Value::as_str) {
			metadata.append(key, text);
		}
	}
	metadata
}

fn kind(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "a boolean",
		Value::Number(_) => "a number",
		Value::String(_) => "a string",
		Value::Array(_) => "an array",
		Value::Object(_) => "an object",
	}
}
