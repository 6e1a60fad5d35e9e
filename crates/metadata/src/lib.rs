//! Call metadata: a case-insensitive mapping from key to an ordered list of
//! string values, plus its JSON host representation.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};

mod host;

pub use host::{from_host, from_host_lossy, to_host};

/// Error decoding metadata from its host representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
	/// The top-level value is not an object.
	#[error("metadata must be an object, got {found}")]
	NotAnObject { found: &'static str },
	/// A key maps to something other than a list (or null).
	#[error("metadata key {key:?} must map to a list of strings, got {found}")]
	NotAList { key: String, found: &'static str },
	/// A list element is not a string.
	#[error("metadata key {key:?} has a non-string value at index {index}")]
	NotAString { key: String, index: usize },
	/// Metadata given as text is not valid JSON.
	#[error("metadata is not valid JSON: {0}")]
	Json(String),
}

/// Multi-valued metadata with ASCII-lowercased keys.
///
/// Value order within a key is preserved. A key whose value list would be
/// empty is not stored, so an absent key and an empty key are the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
	#[serde(deserialize_with = "deserialize_entries")]
	entries: BTreeMap<String, Vec<String>>,
}

fn normalize(key: &str) -> String {
	key.to_ascii_lowercase()
}

fn deserialize_entries<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let raw = BTreeMap::<String, Option<Vec<String>>>::deserialize(deserializer)?;
	let mut metadata = Metadata::new();
	for (key, values) in raw {
		for value in values.into_iter().flatten() {
			metadata.append(&key, value);
		}
	}
	Ok(metadata.entries)
}

impl Metadata {
	/// Creates empty metadata.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of distinct keys.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true when no key is present.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns the first value stored under `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.get_all(key).first().map(String::as_str)
	}

	/// Returns every value stored under `key`, in insertion order.
	pub fn get_all(&self, key: &str) -> &[String] {
		self.entries.get(&normalize(key)).map(Vec::as_slice).unwrap_or_default()
	}

	/// Returns true when `key` has at least one value.
	pub fn contains_key(&self, key: &str) -> bool {
		self.entries.contains_key(&normalize(key))
	}

	/// Appends `value` after any values already stored under `key`.
	pub fn append(&mut self, key: &str, value: impl Into<String>) {
		self.entries.entry(normalize(key)).or_default().push(value.into());
	}

	/// Replaces every value under `key`. An empty list removes the key.
	pub fn set<I, V>(&mut self, key: &str, values: I)
	where
		I: IntoIterator<Item = V>,
		V: Into<String>,
	{
		let values: Vec<String> = values.into_iter().map(Into::into).collect();
		let key = normalize(key);
		if values.is_empty() {
			self.entries.remove(&key);
		} else {
			self.entries.insert(key, values);
		}
	}

	/// Removes `key`, returning its values.
	pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
		self.entries.remove(&normalize(key))
	}

	/// Iterates keys in lexical order with their value lists.
	pub fn iter(&self) -> Iter<'_> {
		Iter {
			inner: self.entries.iter(),
		}
	}

	/// Appends every value of `other` to this mapping.
	pub fn merge(&mut self, other: Metadata) {
		for (key, values) in other.entries {
			self.entries.entry(key).or_default().extend(values);
		}
	}
}

/// Borrowing iterator over [`Metadata`] entries.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
	inner: btree_map::Iter<'a, String, Vec<String>>,
}

impl<'a> Iterator for Iter<'a> {
	type Item = (&'a str, &'a [String]);

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(|(key, values)| (key.as_str(), values.as_slice()))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.inner.size_hint()
	}
}

impl<'a> IntoIterator for &'a Metadata {
	type Item = (&'a str, &'a [String]);
	type IntoIter = Iter<'a>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

impl IntoIterator for Metadata {
	type Item = (String, Vec<String>);
	type IntoIter = btree_map::IntoIter<String, Vec<String>>;

	fn into_iter(self) -> Self::IntoIter {
		self.entries.into_iter()
	}
}

impl<K: AsRef<str>, V: Into<String>> Extend<(K, V)> for Metadata {
	fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
		for (key, value) in iter {
			self.append(key.as_ref(), value);
		}
	}
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut metadata = Self::new();
		metadata.extend(iter);
		metadata
	}
}

#[cfg(test)]
mod tests;
