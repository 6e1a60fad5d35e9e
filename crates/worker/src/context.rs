use std::fmt;

use tokio_util::sync::CancellationToken;

/// Cancellable context carried by every call and stream.
///
/// Contexts form a tree: cancelling a connection context cancels every call
/// and stream derived from it, while cancelling one stream leaves its siblings
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
	cancel: CancellationToken,
}

impl CallContext {
	/// Creates a new root context.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a context that is cancelled whenever `self` is.
	pub fn child(&self) -> Self {
		Self {
			cancel: self.cancel.child_token(),
		}
	}

	/// Requests cancellation of this context and all of its children.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Returns true when cancellation is requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Future resolving when cancellation is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	/// Returns the underlying token for select loops.
	pub fn token(&self) -> &CancellationToken {
		&self.cancel
	}

	/// Derives a child context paired with a hook that runs `on_finish` and
	/// then cancels the child.
	///
	/// The hook fires at most once: explicitly through [`FinishHook::finish`]
	/// or implicitly when dropped.
	pub fn with_finish_hook(&self, on_finish: impl FnOnce() + Send + 'static) -> (Self, FinishHook) {
		let child = self.child();
		let token = child.cancel.clone();
		let hook = FinishHook::new(move || {
			on_finish();
			token.cancel();
		});
		(child, hook)
	}
}

/// One-shot completion callback.
pub struct FinishHook {
	callback: Option<Box<dyn FnOnce() + Send>>,
}

impl FinishHook {
	/// Wraps a callback to run exactly once.
	pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
		Self {
			callback: Some(Box::new(callback)),
		}
	}

	/// Runs the callback now.
	pub fn finish(mut self) {
		self.fire();
	}

	fn fire(&mut self) {
		if let Some(callback) = self.callback.take() {
			callback();
		}
	}
}

impl Drop for FinishHook {
	fn drop(&mut self) {
		self.fire();
	}
}

impl fmt::Debug for FinishHook {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FinishHook")
			.field("pending", &self.callback.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	#[test]
	fn child_follows_parent_cancellation() {
		let parent = CallContext::new();
		let child = parent.child();
		let sibling = parent.child();
		child.cancel();
		assert!(child.is_cancelled());
		assert!(!sibling.is_cancelled());
		assert!(!parent.is_cancelled());

		parent.cancel();
		assert!(sibling.is_cancelled());
	}

	#[test]
	fn finish_hook_runs_once() {
		let hits = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&hits);
		let hook = FinishHook::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		hook.finish();
		assert_eq!(hits.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn dropped_hook_fires() {
		let root = CallContext::new();
		let finished = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&finished);
		let (ctx, hook) = root.with_finish_hook(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		});
		assert!(!ctx.is_cancelled());
		drop(hook);
		assert!(ctx.is_cancelled());
		assert_eq!(finished.load(Ordering::SeqCst), 1);
		assert!(!root.is_cancelled());
	}

	#[tokio::test]
	async fn cancelled_resolves_after_cancel() {
		let ctx = CallContext::new();
		let waiter = tokio::spawn({
			let ctx = ctx.clone();
			async move { ctx.cancelled().await }
		});
		ctx.cancel();
		tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
			.await
			.unwrap()
			.unwrap();
	}
}
