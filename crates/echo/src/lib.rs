//! Echo service served over bufnet in tests.
//!
//! Four methods cover the four call shapes: `Once` (unary), `Many` (server
//! streaming), `Buff` (client streaming) and `Live` (bidirectional).

pub mod proto;
mod server;

pub use server::{EchoServer, circular_shift};
