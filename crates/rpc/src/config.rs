use std::path::Path;

use bufnet_worker::RuntimeOptions;
use serde::Deserialize;
use tonic::transport::Uri;

use crate::{Error, Result};

/// Default duplex buffer capacity per direction.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Tunables of one listener and everything dialed through it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
	/// Bytes buffered per direction of each in-memory connection.
	pub buffer_size: usize,
	/// Dials that may wait for the server to accept them.
	pub accept_backlog: usize,
	/// Messages queued per direction of each stream.
	pub stream_capacity: usize,
	/// Stand-in authority used for the in-memory address.
	pub authority: String,
	/// Runtime sizing.
	pub runtime: RuntimeConfig,
}

/// `[runtime]` table of [`BridgeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	/// Async worker threads.
	pub worker_threads: usize,
	/// Upper bound on concurrently running bridged units.
	pub max_blocking_threads: usize,
	/// Thread name prefix.
	pub thread_name: String,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			buffer_size: DEFAULT_BUFFER_SIZE,
			accept_backlog: 16,
			stream_capacity: 1,
			authority: "bufnet".to_string(),
			runtime: RuntimeConfig::default(),
		}
	}
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		let options = RuntimeOptions::default();
		Self {
			worker_threads: options.worker_threads,
			max_blocking_threads: options.max_blocking_threads,
			thread_name: options.thread_name,
		}
	}
}

impl BridgeConfig {
	/// Parses and validates a TOML document. Missing keys take their defaults.
	pub fn from_toml_str(text: &str) -> Result<Self> {
		let config: Self = toml::from_str(text).map_err(|err| Error::Config(err.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	/// Reads and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
		Self::from_toml_str(&text)
	}

	/// Rejects zero sizes and authorities that do not form a valid URI.
	pub fn validate(&self) -> Result<()> {
		let sizes = [
			("buffer_size", self.buffer_size),
			("accept_backlog", self.accept_backlog),
			("stream_capacity", self.stream_capacity),
			("runtime.worker_threads", self.runtime.worker_threads),
			("runtime.max_blocking_threads", self.runtime.max_blocking_threads),
		];
		if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
			return Err(Error::Config(format!("{name} must be greater than zero")));
		}
		self.endpoint_uri()?;
		Ok(())
	}

	pub(crate) fn endpoint_uri(&self) -> Result<Uri> {
		let uri = format!("http://{}", self.authority);
		match uri.parse::<Uri>() {
			Ok(parsed) if !self.authority.is_empty() && parsed.path() == "/" => Ok(parsed),
			_ => Err(Error::Config(format!("authority {:?} is not a valid host", self.authority))),
		}
	}

	pub(crate) fn runtime_options(&self) -> RuntimeOptions {
		RuntimeOptions {
			worker_threads: self.runtime.worker_threads,
			max_blocking_threads: self.runtime.max_blocking_threads,
			thread_name: self.runtime.thread_name.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_uses_defaults() {
		let config = BridgeConfig::from_toml_str("").unwrap();
		assert_eq!(config, BridgeConfig::default());
		assert_eq!(config.buffer_size, 1024 * 1024);
		assert_eq!(config.runtime.thread_name, "bufnet-worker");
	}

	#[test]
	fn overrides_nested_runtime_table() {
		let config = BridgeConfig::from_toml_str(
			r#"
			buffer_size = 4096
			authority = "echo.local"

			[runtime]
			worker_threads = 1
			"#,
		)
		.unwrap();
		assert_eq!(config.buffer_size, 4096);
		assert_eq!(config.authority, "echo.local");
		assert_eq!(config.runtime.worker_threads, 1);
		assert_eq!(config.runtime.max_blocking_threads, 256);
	}

	#[test]
	fn rejects_zero_sizes() {
		let err = BridgeConfig::from_toml_str("stream_capacity = 0").unwrap_err();
		assert!(matches!(err, Error::Config(ref msg) if msg.contains("stream_capacity")), "{err}");
	}

	#[test]
	fn rejects_unknown_keys() {
		assert!(matches!(BridgeConfig::from_toml_str("buffer = 1"), Err(Error::Config(_))));
	}

	#[test]
	fn rejects_authorities_with_paths() {
		let config = BridgeConfig {
			authority: "bufnet/extra".into(),
			..BridgeConfig::default()
		};
		assert!(matches!(config.validate(), Err(Error::Config(_))));

		let config = BridgeConfig {
			authority: String::new(),
			..BridgeConfig::default()
		};
		assert!(matches!(config.validate(), Err(Error::Config(_))));
	}
}
