use std::future::Future;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Sizing for the runtime that executes engine work and bridged units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
	/// Async worker threads driving the engine and transport.
	pub worker_threads: usize,
	/// Upper bound on blocking-pool threads, i.e. concurrently running units.
	pub max_blocking_threads: usize,
	/// Thread name prefix.
	pub thread_name: String,
}

impl Default for RuntimeOptions {
	fn default() -> Self {
		Self {
			worker_threads: 2,
			max_blocking_threads: 256,
			thread_name: "bufnet-worker".to_string(),
		}
	}
}

/// Owned multi-threaded runtime that can be dropped from any context.
///
/// Dropping a [`Runtime`] inside an async context panics, and hosts routinely
/// tear transports down from async code. Dropping a `RuntimeHost` shuts the
/// runtime down in the background instead.
#[derive(Debug)]
pub struct RuntimeHost {
	runtime: Option<Runtime>,
	handle: Handle,
}

impl RuntimeHost {
	/// Builds a runtime with all drivers enabled.
	pub fn new(options: &RuntimeOptions) -> std::io::Result<Self> {
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(options.worker_threads)
			.max_blocking_threads(options.max_blocking_threads)
			.thread_name(options.thread_name.clone())
			.build()?;
		let handle = runtime.handle().clone();
		tracing::debug!(
			worker_threads = options.worker_threads,
			max_blocking_threads = options.max_blocking_threads,
			"worker.runtime.start"
		);
		Ok(Self {
			runtime: Some(runtime),
			handle,
		})
	}

	/// Returns a handle to the owned runtime.
	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Spawns an async task with worker classification metadata.
	pub fn spawn<F>(&self, class: TaskClass, fut: F) -> JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		tracing::trace!(worker_class = class.as_str(), "worker.spawn");
		self.handle.spawn(fut)
	}
}

impl Drop for RuntimeHost {
	fn drop(&mut self) {
		if let Some(runtime) = self.runtime.take() {
			tracing::debug!("worker.runtime.shutdown");
			runtime.shutdown_background();
		}
	}
}
