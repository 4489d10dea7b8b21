//! Core primitives for duskswitch.
//!
//! This crate carries the pieces of duskswitch that have no operating-system
//! dependencies:
//!
//! - [`Signal<Args>`] - type-safe signal/slot notification
//! - [`WorkerPool`] - fire-and-forget background task execution
//! - [`thread_check::ThreadAffinity`] - verification for loop-thread-only
//!   operations
//!
//! Everything here is usable (and tested) on any platform; the native-shell
//! integration lives in the `duskswitch` crate.

pub mod signal;
pub mod thread_check;
pub mod worker;

pub use signal::{ConnectionId, Signal};
pub use thread_check::ThreadAffinity;
pub use worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
