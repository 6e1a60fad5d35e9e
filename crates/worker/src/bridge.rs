use std::cell::Cell;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::panic::panic_message;
use crate::{Scope, TaskClass};

thread_local! {
	static IN_UNIT: Cell<bool> = const { Cell::new(false) };
}

/// Failure of the bridge itself rather than of the unit's own work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitFailure {
	/// The unit panicked; the payload is rendered as text.
	#[error("unit panicked: {0}")]
	Panicked(String),
	/// The unit was dropped before settling, e.g. during runtime shutdown.
	#[error("unit abandoned before settling")]
	Abandoned,
	/// A unit tried to block on another pending value.
	#[error("blocking wait from inside a bridged unit")]
	ReentrantWait,
}

/// Deferred result of a bridged unit.
///
/// Settles exactly once, with the unit's success value or its failure.
#[derive(Debug)]
#[must_use = "a pending value does nothing unless awaited or waited on"]
pub struct Pending<T, E> {
	rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Pending<T, E> {
	/// Returns a pending value that is already settled.
	pub fn ready(result: Result<T, E>) -> Self {
		let (tx, rx) = oneshot::channel();
		let _ = tx.send(result);
		Self { rx }
	}
}

impl<T, E: From<UnitFailure>> Future for Pending<T, E> {
	type Output = Result<T, E>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|settled| settled.unwrap_or_else(|_| Err(E::from(UnitFailure::Abandoned))))
	}
}

/// Runs blocking units of work off the host thread and hands back [`Pending`]
/// values.
///
/// Every unit is accounted for in the bridge's [`Scope`] until its settlement
/// has been delivered.
#[derive(Debug, Clone)]
pub struct Bridge {
	scope: Scope,
	handle: Handle,
}

impl Bridge {
	/// Creates a bridge running units on `handle`'s blocking pool.
	pub fn new(scope: Scope, handle: Handle) -> Self {
		Self { scope, handle }
	}

	/// Returns the scope units are registered in.
	pub fn scope(&self) -> &Scope {
		&self.scope
	}

	/// Returns the runtime handle units run on.
	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Starts `unit` on a fresh blocking thread and returns immediately.
	///
	/// A panicking unit settles with [`UnitFailure::Panicked`] instead of
	/// taking the process down.
	pub fn submit<T, E, F>(&self, class: TaskClass, unit: F) -> Pending<T, E>
	where
		F: FnOnce() -> Result<T, E> + Send + 'static,
		T: Send + 'static,
		E: From<UnitFailure> + Send + 'static,
	{
		let guard = self.scope.enter();
		let (tx, rx) = oneshot::channel();
		tracing::trace!(
			worker_class = class.as_str(),
			outstanding = self.scope.outstanding(),
			"bridge.submit"
		);

		self.handle.spawn_blocking(move || {
			let outcome = IN_UNIT.with(|flag| {
				flag.set(true);
				let outcome = catch_unwind(AssertUnwindSafe(unit));
				flag.set(false);
				outcome
			});
			let settled = match outcome {
				Ok(result) => result,
				Err(payload) => {
					let message = panic_message(payload.as_ref());
					tracing::warn!(worker_class = class.as_str(), panic = %message, "bridge.unit_panicked");
					Err(E::from(UnitFailure::Panicked(message)))
				}
			};
			let _ = tx.send(settled);
			drop(guard);
		});

		Pending { rx }
	}

	/// Blocks the calling thread until `pending` settles.
	///
	/// Must be called from a synchronous host thread. From inside a bridged
	/// unit it fails with [`UnitFailure::ReentrantWait`] instead of deadlocking
	/// the blocking pool.
	pub fn wait<T, E: From<UnitFailure>>(&self, pending: Pending<T, E>) -> Result<T, E> {
		if IN_UNIT.with(Cell::get) {
			return Err(E::from(UnitFailure::ReentrantWait));
		}
		let _guard = self.scope.enter();
		pending
			.rx
			.blocking_recv()
			.unwrap_or_else(|_| Err(E::from(UnitFailure::Abandoned)))
	}
}

#[cfg(test)]
mod tests;
