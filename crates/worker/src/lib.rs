//! Worker primitives shared by the bufnet bridge.
//!
//! * [`Scope`] counts outstanding operations so teardown can wait for them.
//! * [`Bridge`] runs blocking units on a runtime's blocking pool and hands
//!   back [`Pending`] values the host can await or block on.
//! * [`CallContext`] and [`FinishHook`] carry per-call cancellation.
//! * [`RuntimeHost`] owns the multi-threaded runtime everything runs on.

mod bridge;
mod class;
mod context;
mod panic;
mod scope;
mod spawn;

pub use bridge::{Bridge, Pending, UnitFailure};
pub use class::TaskClass;
pub use context::{CallContext, FinishHook};
pub use panic::{join_error_panic_message, panic_message};
pub use scope::{Scope, ScopeGuard};
pub use spawn::{RuntimeHost, RuntimeOptions};

#[cfg(test)]
mod panic_tests;
