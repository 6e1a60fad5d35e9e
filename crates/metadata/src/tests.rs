use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use super::*;

#[test]
fn keys_are_case_insensitive() {
	let mut md = Metadata::new();
	md.append("Authorization", "a");
	md.append("AUTHORIZATION", "b");
	assert_eq!(md.len(), 1);
	assert_eq!(md.get_all("authorization"), ["a", "b"]);
	assert_eq!(md.get("AuThOrIzAtIoN"), Some("a"));
}

#[test]
fn empty_value_list_is_absent() {
	let mut md = Metadata::new();
	md.set("x", Vec::<String>::new());
	assert!(md.is_empty());
	assert!(!md.contains_key("x"));
	assert!(md.get_all("x").is_empty());

	md.set("x", ["1", "2"]);
	md.set("X", Vec::<String>::new());
	assert!(md.is_empty());
}

#[test]
fn merge_appends_in_order() {
	let mut left: Metadata = [("k", "1")].into_iter().collect();
	let right: Metadata = [("K", "2"), ("other", "x")].into_iter().collect();
	left.merge(right);
	assert_eq!(left.get_all("k"), ["1", "2"]);
	assert_eq!(left.get("other"), Some("x"));
}

#[test]
fn empty_metadata_encodes_to_empty_object() {
	assert_eq!(to_host(&Metadata::new()), json!({}));
}

#[test]
fn encodes_every_value() {
	let md: Metadata = [("a", "1"), ("a", "2"), ("b", "3")].into_iter().collect();
	assert_eq!(to_host(&md), json!({ "a": ["1", "2"], "b": ["3"] }));
}

#[test]
fn from_host_treats_null_as_empty() {
	let md = from_host(&json!({ "a": null, "b": [] , "c": ["v"] })).unwrap();
	assert_eq!(md, [("c", "v")].into_iter().collect::<Metadata>());
}

#[test]
fn from_host_rejects_unexpected_shapes() {
	assert_eq!(
		from_host(&json!(["a"])),
		Err(MetadataError::NotAnObject { found: "an array" })
	);
	assert_eq!(
		from_host(&json!({ "a": "v" })),
		Err(MetadataError::NotAList {
			key: "a".into(),
			found: "a string"
		})
	);
	assert_eq!(
		from_host(&json!({ "a": ["v", 3] })),
		Err(MetadataError::NotAString { key: "a".into(), index: 1 })
	);
}

#[test]
fn from_host_lossy_skips_malformed_entries() {
	assert!(from_host_lossy(&json!("nope")).is_empty());
	assert!(from_host_lossy(&json!(null)).is_empty());

	let md = from_host_lossy(&json!({ "a": "v", "b": ["x", 1, "y"] }));
	assert_eq!(md, [("b", "x"), ("b", "y")].into_iter().collect::<Metadata>());
}

#[test]
fn serde_round_trip_matches_host_shape() {
	let md: Metadata = [("Key", "1"), ("key", "2")].into_iter().collect();
	let text = serde_json::to_string(&md).unwrap();
	assert_eq!(text, r#"{"key":["1","2"]}"#);

	let back: Metadata = serde_json::from_str(r#"{"KEY":["1","2"],"gone":null,"none":[]}"#).unwrap();
	assert_eq!(back, md);
}

fn metadata_strategy() -> impl Strategy<Value = Metadata> {
	proptest::collection::btree_map("[a-z0-9-]{1,12}", proptest::collection::vec(".{0,16}", 1..4), 0..6)
		.prop_map(|entries| {
			let mut md = Metadata::new();
			for (key, values) in entries {
				md.set(&key, values);
			}
			md
		})
}

proptest! {
	#[test]
	fn host_codec_round_trips(md in metadata_strategy()) {
		prop_assert_eq!(from_host(&to_host(&md)), Ok(md.clone()));
		prop_assert_eq!(from_host_lossy(&to_host(&md)), md);
	}
}
