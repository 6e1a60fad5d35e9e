use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::{RuntimeHost, RuntimeOptions};

#[derive(Debug, PartialEq, Eq)]
enum TestError {
	Unit(UnitFailure),
	Work(&'static str),
}

impl From<UnitFailure> for TestError {
	fn from(failure: UnitFailure) -> Self {
		Self::Unit(failure)
	}
}

fn bridge() -> (RuntimeHost, Bridge) {
	let host = RuntimeHost::new(&RuntimeOptions::default()).unwrap();
	let bridge = Bridge::new(Scope::new(), host.handle().clone());
	(host, bridge)
}

#[test]
fn submit_settles_with_unit_value() {
	let (_host, bridge) = bridge();
	let pending = bridge.submit(TaskClass::Call, || Ok::<_, TestError>(41 + 1));
	assert_eq!(bridge.wait(pending), Ok(42));
}

#[test]
fn submit_settles_with_unit_error() {
	let (_host, bridge) = bridge();
	let pending = bridge.submit(TaskClass::Call, || Err::<(), _>(TestError::Work("nope")));
	assert_eq!(bridge.wait(pending), Err(TestError::Work("nope")));
}

#[test]
fn panicking_unit_rejects_instead_of_crashing() {
	let (_host, bridge) = bridge();
	let pending = bridge.submit(TaskClass::Call, || -> Result<(), TestError> { panic!("exploded") });
	assert_eq!(
		bridge.wait(pending),
		Err(TestError::Unit(UnitFailure::Panicked("exploded".to_string())))
	);
	assert_eq!(bridge.scope().outstanding(), 0);
}

#[test]
fn wait_inside_unit_is_rejected() {
	let (_host, bridge) = bridge();
	let inner = bridge.clone();
	let pending = bridge.submit(TaskClass::Call, move || {
		let nested = Pending::<(), TestError>::ready(Ok(()));
		inner.wait(nested)
	});
	assert_eq!(bridge.wait(pending), Err(TestError::Unit(UnitFailure::ReentrantWait)));
}

#[test]
fn units_run_concurrently() {
	let (_host, bridge) = bridge();
	let running = Arc::new(AtomicUsize::new(0));
	let barrier = Arc::new(std::sync::Barrier::new(4));

	let pendings: Vec<_> = (0..4)
		.map(|_| {
			let running = Arc::clone(&running);
			let barrier = Arc::clone(&barrier);
			bridge.submit(TaskClass::Stream, move || {
				running.fetch_add(1, Ordering::SeqCst);
				barrier.wait();
				Ok::<_, TestError>(())
			})
		})
		.collect();

	for pending in pendings {
		bridge.wait(pending).unwrap();
	}
	assert_eq!(running.load(Ordering::SeqCst), 4);
}

#[test]
fn scope_drains_after_settlement() {
	let (_host, bridge) = bridge();
	let pending = bridge.submit(TaskClass::Control, || {
		std::thread::sleep(Duration::from_millis(20));
		Ok::<_, TestError>("done")
	});
	assert_eq!(bridge.scope().outstanding(), 1);
	bridge.scope().drain();
	assert_eq!(bridge.scope().outstanding(), 0);
	assert_eq!(bridge.wait(pending), Ok("done"));
}

#[test]
fn pending_is_awaitable() {
	let (host, bridge) = bridge();
	let pending = bridge.submit(TaskClass::Call, || Ok::<_, TestError>(7));
	let value = host.handle().block_on(pending);
	assert_eq!(value, Ok(7));
}

#[test]
fn ready_pending_settles_immediately() {
	let (_host, bridge) = bridge();
	let pending = Pending::<u8, TestError>::ready(Err(TestError::Work("early")));
	assert_eq!(bridge.wait(pending), Err(TestError::Work("early")));
}
