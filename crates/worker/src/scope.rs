use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ScopeInner {
	outstanding: AtomicUsize,
	lock: Mutex<()>,
	idle: Condvar,
	notify: Notify,
}

/// Counter of outstanding operations for one transport.
///
/// Every bridged unit holds a [`ScopeGuard`] from submission until its
/// settlement has been delivered, so a drained scope means no settlement can
/// still be in flight.
#[derive(Debug, Clone, Default)]
pub struct Scope {
	inner: Arc<ScopeInner>,
}

impl Scope {
	/// Creates an empty scope.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the number of operations currently outstanding.
	pub fn outstanding(&self) -> usize {
		self.inner.outstanding.load(Ordering::Acquire)
	}

	/// Registers one outstanding operation until the guard is dropped.
	pub fn enter(&self) -> ScopeGuard {
		self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
		ScopeGuard { scope: self.clone() }
	}

	/// Blocks the calling thread until no operation is outstanding.
	pub fn drain(&self) {
		let mut guard = self.inner.lock.lock();
		while self.outstanding() != 0 {
			self.inner.idle.wait(&mut guard);
		}
	}

	/// Like [`Self::drain`] with a deadline. Returns `true` if the scope drained.
	pub fn drain_timeout(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut guard = self.inner.lock.lock();
		while self.outstanding() != 0 {
			if self.inner.idle.wait_until(&mut guard, deadline).timed_out() {
				return self.outstanding() == 0;
			}
		}
		true
	}

	/// Resolves once no operation is outstanding.
	pub async fn drained(&self) {
		loop {
			let notified = self.inner.notify.notified();
			tokio::pin!(notified);
			// Register before checking so a release between the check and the
			// await still wakes us.
			notified.as_mut().enable();
			if self.outstanding() == 0 {
				return;
			}
			notified.await;
		}
	}

	fn release(&self) {
		if self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
			let _guard = self.inner.lock.lock();
			self.inner.idle.notify_all();
			self.inner.notify.notify_waiters();
		}
	}
}

/// Keeps one operation registered in a [`Scope`].
#[derive(Debug)]
#[must_use = "the operation is released as soon as the guard is dropped"]
pub struct ScopeGuard {
	scope: Scope,
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		self.scope.release();
	}
}
